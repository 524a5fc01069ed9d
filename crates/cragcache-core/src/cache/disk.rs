//! Persistent namespace store.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <root>/<namespace>/<sha256(method url)>.entry
//! ```
//!
//! An entry file is one line of JSON metadata followed by the raw body.
//! Every namespace directory carries a marker file; directories without one
//! are not namespaces and are never listed or deleted.
//! Writes go to a uniquely named temp file that is then renamed over the
//! entry, so readers see either the old entry or the new one, never a mix.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::store::{CachedEntry, Namespace, NamespaceHandle, NamespaceStore};
use crate::error::{Result, WorkerError};
use crate::http::{CacheKey, Response};

const ENTRY_EXTENSION: &str = "entry";

const NAMESPACE_MARKER: &str = ".cragcache-namespace";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: CacheKey,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    cached_at: DateTime<Utc>,
}

pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn namespace_dir(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(WorkerError::Config(format!("Invalid namespace name: {name:?}")));
        }
        Ok(self.root.join(name))
    }
}

/// Create a namespace directory and mark it as ours
async fn ensure_namespace_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    let marker = dir.join(NAMESPACE_MARKER);
    if !fs::try_exists(&marker).await? {
        fs::write(&marker, b"").await?;
    }
    Ok(())
}

async fn is_namespace_dir(dir: &Path) -> Result<bool> {
    Ok(fs::try_exists(dir.join(NAMESPACE_MARKER)).await?)
}

#[async_trait]
impl NamespaceStore for DiskStore {
    async fn open(&self, name: &str) -> Result<NamespaceHandle> {
        let dir = self.namespace_dir(name)?;
        ensure_namespace_dir(&dir).await?;
        Ok(Arc::new(DiskNamespace {
            name: name.to_string(),
            dir,
        }))
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() || !is_namespace_dir(&entry.path()).await? {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.namespace_dir(name)?;
        if !is_namespace_dir(&dir).await? {
            if fs::try_exists(&dir).await? {
                warn!(dir = %dir.display(), "Refusing to delete a directory that is not a namespace");
            }
            return Ok(false);
        }
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct DiskNamespace {
    name: String,
    dir: PathBuf,
}

impl DiskNamespace {
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    async fn read_entry(path: &Path) -> Result<Option<(EntryMeta, Vec<u8>)>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let split = bytes
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| WorkerError::CorruptEntry(path.display().to_string()))?;
        let meta: EntryMeta = serde_json::from_slice(&bytes[..split])?;
        Ok(Some((meta, bytes[split + 1..].to_vec())))
    }
}

#[async_trait]
impl Namespace for DiskNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
        let Some((meta, body)) = Self::read_entry(&self.entry_path(key)).await? else {
            return Ok(None);
        };
        // Digest collision or hand-edited file
        if &meta.key != key {
            warn!(namespace = %self.name, key = %key, stored = %meta.key, "Cache entry key mismatch");
            return Ok(None);
        }
        Ok(Some(CachedEntry {
            response: Response {
                status: meta.status,
                status_text: meta.status_text,
                headers: meta.headers,
                body,
            },
            cached_at: meta.cached_at,
        }))
    }

    async fn put(&self, key: CacheKey, response: Response) -> Result<()> {
        let path = self.entry_path(&key);
        let meta = EntryMeta {
            key,
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            cached_at: Utc::now(),
        };
        let mut contents = serde_json::to_vec(&meta)?;
        contents.push(b'\n');
        contents.extend_from_slice(&response.body);

        // A namespace deleted under an open handle is recreated by the write
        ensure_namespace_dir(&self.dir).await?;
        let temp = self.dir.join(format!(
            ".{}-{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, &contents).await?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(namespace = %self.name, key = %meta.key, bytes = contents.len(), "Stored cache entry");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut keys = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some((meta, _))) => keys.push(meta.key),
                Ok(None) => {}
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
