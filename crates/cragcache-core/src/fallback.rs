use tracing::{debug, warn};

use crate::cache::Namespace;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::http::{CacheKey, Request, Response};

/// Which cached document stood in for a failed navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// The exact page was cached
    Exact,
    Offline,
    Shell,
}

/// Read-only chain over what install put in the static namespace:
/// the exact page, then the offline document, then the application shell.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
    offline: CacheKey,
    shell: CacheKey,
}

impl OfflineFallback {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        Ok(Self {
            offline: CacheKey::get(&config.offline_url()?),
            shell: CacheKey::get(&config.shell_url()?),
        })
    }

    /// Never touches the network. When every lookup misses, the original
    /// network error comes back unchanged.
    pub async fn resolve(
        &self,
        ns: &dyn Namespace,
        request: &Request,
        error: WorkerError,
    ) -> Result<(Response, FallbackKind)> {
        let chain = [
            (request.key(), FallbackKind::Exact),
            (self.offline.clone(), FallbackKind::Offline),
            (self.shell.clone(), FallbackKind::Shell),
        ];
        for (key, kind) in chain {
            match ns.match_response(&key).await {
                Ok(Some(response)) => {
                    debug!(url = %request.url, fallback = ?kind, "Serving navigation from cache");
                    return Ok((response, kind));
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Fallback lookup failed"),
            }
        }
        Err(error)
    }
}
