use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{CachedEntry, Namespace, NamespaceHandle, NamespaceStore};
use crate::error::Result;
use crate::http::{CacheKey, Response};

/// Namespace store held entirely in memory.
///
/// A handle opened before its namespace is deleted keeps working against
/// the detached entries; it never brings the namespace back.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: RwLock<BTreeMap<String, Arc<MemoryNamespace>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NamespaceStore for MemoryStore {
    async fn open(&self, name: &str) -> Result<NamespaceHandle> {
        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryNamespace::new(name)));
        Ok(Arc::clone(ns) as NamespaceHandle)
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.namespaces.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.namespaces.write().await.remove(name).is_some())
    }
}

pub struct MemoryNamespace {
    name: String,
    entries: RwLock<HashMap<CacheKey, CachedEntry>>,
}

impl MemoryNamespace {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Namespace for MemoryNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: CacheKey, response: Response) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key, CachedEntry::new(response));
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
