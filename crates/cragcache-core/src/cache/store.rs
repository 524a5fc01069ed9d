use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::http::{CacheKey, Response};

/// A stored response and the instant it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// One named key to response store.
///
/// Writes replace whatever is stored at the key as a whole; there is no
/// read-modify-write, so concurrent writers resolve last-write-wins.
#[async_trait]
pub trait Namespace: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>>;

    async fn put(&self, key: CacheKey, response: Response) -> Result<()>;

    /// Remove one entry. Removing a missing entry is not an error.
    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    async fn keys(&self) -> Result<Vec<CacheKey>>;

    /// Look up only the response
    async fn match_response(&self, key: &CacheKey) -> Result<Option<Response>> {
        Ok(self.get(key).await?.map(|entry| entry.response))
    }
}

pub type NamespaceHandle = Arc<dyn Namespace>;

/// Registry of namespaces by name.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Open a namespace, creating it when it does not exist
    async fn open(&self, name: &str) -> Result<NamespaceHandle>;

    async fn names(&self) -> Result<Vec<String>>;

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.names().await?.iter().any(|n| n == name))
    }

    /// Delete a whole namespace. Deleting a missing namespace is not an error.
    async fn delete(&self, name: &str) -> Result<bool>;
}
