//! Fetch-and-store strategies.
//!
//! Every strategy shares one rule: only ok responses are written, and the
//! copy written is a clone of the one handed back to the page.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{Namespace, NamespaceHandle};
use crate::error::Result;
use crate::fallback::{FallbackKind, OfflineFallback};
use crate::http::{Request, Response};
use crate::net::Network;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    Cache,
    Fallback(FallbackKind),
}

/// A response for the page, plus the background refresh it started, if any.
#[derive(Debug)]
pub struct Served {
    pub response: Response,
    pub source: Source,
    pub refresh: Option<JoinHandle<()>>,
}

impl Served {
    fn new(response: Response, source: Source) -> Self {
        Self {
            response,
            source,
            refresh: None,
        }
    }

    /// Wait for the background refresh to finish. Its outcome is already
    /// logged; this only orders the caller after it.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.refresh.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background refresh task panicked");
            }
        }
    }
}

#[derive(Clone)]
pub struct Strategies {
    network: Arc<dyn Network>,
    fallback: OfflineFallback,
}

impl Strategies {
    pub fn new(network: Arc<dyn Network>, fallback: OfflineFallback) -> Self {
        Self { network, fallback }
    }

    /// Stale-while-revalidate. A hit is served at once and refreshed by a
    /// detached task; a miss waits for the network.
    pub async fn cache_first_refresh(&self, ns: NamespaceHandle, request: Request) -> Result<Served> {
        if let Some(cached) = lookup(ns.as_ref(), &request).await {
            let network = Arc::clone(&self.network);
            let refresh_ns = Arc::clone(&ns);
            let refresh_request = request.clone();
            let refresh = tokio::spawn(async move {
                if let Err(e) =
                    fetch_and_store(network.as_ref(), refresh_ns.as_ref(), &refresh_request).await
                {
                    debug!(url = %refresh_request.url, error = %e, "Background refresh failed");
                }
            });
            return Ok(Served {
                response: cached,
                source: Source::Cache,
                refresh: Some(refresh),
            });
        }

        match fetch_and_store(self.network.as_ref(), ns.as_ref(), &request).await {
            Ok(response) => Ok(Served::new(response, Source::Network)),
            Err(e) => {
                // Another request may have filled the entry meanwhile
                if let Some(cached) = lookup(ns.as_ref(), &request).await {
                    return Ok(Served::new(cached, Source::Cache));
                }
                warn!(url = %request.url, error = %e, "Fetch failed with nothing cached");
                Err(e)
            }
        }
    }

    pub async fn network_first_with_offline_fallback(
        &self,
        ns: NamespaceHandle,
        request: Request,
    ) -> Result<Served> {
        match fetch_and_store(self.network.as_ref(), ns.as_ref(), &request).await {
            Ok(response) => Ok(Served::new(response, Source::Network)),
            Err(e) => {
                let (response, kind) = self.fallback.resolve(ns.as_ref(), &request, e).await?;
                let source = match kind {
                    FallbackKind::Exact => Source::Cache,
                    other => Source::Fallback(other),
                };
                Ok(Served::new(response, source))
            }
        }
    }

    pub async fn network_first_then_cache(&self, ns: NamespaceHandle, request: Request) -> Result<Served> {
        match fetch_and_store(self.network.as_ref(), ns.as_ref(), &request).await {
            Ok(response) => Ok(Served::new(response, Source::Network)),
            Err(e) => match lookup(ns.as_ref(), &request).await {
                Some(cached) => Ok(Served::new(cached, Source::Cache)),
                None => Err(e),
            },
        }
    }

    /// No caching at all.
    pub async fn pass_through(&self, request: Request) -> Result<Served> {
        let response = self.network.fetch(&request).await?;
        Ok(Served::new(response, Source::Network))
    }
}

/// Cache read that treats a storage failure as a miss
async fn lookup(ns: &dyn Namespace, request: &Request) -> Option<Response> {
    match ns.match_response(&request.key()).await {
        Ok(found) => found,
        Err(e) => {
            warn!(namespace = ns.name(), url = %request.url, error = %e, "Cache read failed");
            None
        }
    }
}

/// Fetch, write a copy through when ok, and return the response either way.
/// A failed write is logged; the page still gets its response.
async fn fetch_and_store(network: &dyn Network, ns: &dyn Namespace, request: &Request) -> Result<Response> {
    let response = network.fetch(request).await?;
    if response.is_ok() {
        if let Err(e) = ns.put(request.key(), response.clone()).await {
            warn!(namespace = ns.name(), url = %request.url, error = %e, "Cache write failed");
        }
    } else {
        debug!(url = %request.url, status = response.status, "Not caching error response");
    }
    Ok(response)
}
