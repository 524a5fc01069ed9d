use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use super::store::{NamespaceHandle, NamespaceStore};
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::http::{Request, RequestMode, Response};
use crate::net::Network;

/// Logical role of a namespace. Each role has exactly one current,
/// version-stamped namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceRole {
    /// Application shell, static assets, pages and other dynamic content
    Static,
    /// GeoJSON and map tiles
    Dynamic,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub required: usize,
    pub external_cached: usize,
    pub external_failed: Vec<String>,
}

/// Owns the namespace store and knows which namespaces are current.
#[derive(Clone)]
pub struct NamespaceManager {
    store: Arc<dyn NamespaceStore>,
    static_name: String,
    dynamic_name: String,
}

impl NamespaceManager {
    pub fn new(store: Arc<dyn NamespaceStore>, config: &WorkerConfig) -> Self {
        Self {
            store,
            static_name: config.static_namespace(),
            dynamic_name: config.dynamic_namespace(),
        }
    }

    pub fn store(&self) -> &Arc<dyn NamespaceStore> {
        &self.store
    }

    pub fn name(&self, role: NamespaceRole) -> &str {
        match role {
            NamespaceRole::Static => &self.static_name,
            NamespaceRole::Dynamic => &self.dynamic_name,
        }
    }

    pub async fn open(&self, role: NamespaceRole) -> Result<NamespaceHandle> {
        self.store.open(self.name(role)).await
    }

    /// Populate the current static namespace.
    ///
    /// Every manifest entry is fetched before anything is stored; a single
    /// failed fetch or non-ok status fails the install and leaves the
    /// namespace untouched. External resources are then cached one by one,
    /// each failure logged and dropped.
    pub async fn provision_on_install(
        &self,
        network: &dyn Network,
        config: &WorkerConfig,
    ) -> Result<InstallReport> {
        let ns = self.open(NamespaceRole::Static).await?;
        // Both roles exist from install on, even before any geo data is cached
        self.open(NamespaceRole::Dynamic).await?;
        info!(namespace = %self.static_name, "Caching application shell");

        let requests = config
            .static_manifest
            .iter()
            .map(|path| config.resolve(path).map(Request::from_url))
            .collect::<Result<Vec<_>>>()?;

        let fetched = try_join_all(requests.into_iter().map(|request| async move {
            let url = request.url.to_string();
            let response = fetch_ok(network, &request).await.map_err(|e| WorkerError::Install {
                url,
                source: Box::new(e),
            })?;
            Ok::<_, WorkerError>((request, response))
        }))
        .await?;

        let required = fetched.len();
        for (request, response) in fetched {
            ns.put(request.key(), response).await?;
        }

        let outcomes = join_all(config.external_resources.iter().map(|url| {
            let ns = Arc::clone(&ns);
            async move {
                let result = async {
                    let request = Request::get(url)?.with_mode(RequestMode::Cors);
                    let response = fetch_ok(network, &request).await?;
                    ns.put(request.key(), response).await
                }
                .await;
                if let Err(ref e) = result {
                    warn!(url = %url, error = %e, "Could not cache external resource");
                }
                (url.clone(), result.is_ok())
            }
        }))
        .await;

        let mut report = InstallReport {
            required,
            ..InstallReport::default()
        };
        for (url, cached) in outcomes {
            if cached {
                report.external_cached += 1;
            } else {
                report.external_failed.push(url);
            }
        }
        info!(
            required = report.required,
            external_cached = report.external_cached,
            external_failed = report.external_failed.len(),
            "Install provisioning complete"
        );
        Ok(report)
    }

    /// Delete every namespace that is not current, whatever its role or prefix.
    /// Returns the deleted names.
    pub async fn reconcile_on_activate(&self) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .store
            .names()
            .await?
            .into_iter()
            .filter(|name| name != &self.static_name && name != &self.dynamic_name)
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            info!(namespace = %name, "Deleting old cache");
            self.store.delete(name).await
        }))
        .await;
        for result in results {
            result?;
        }
        Ok(stale)
    }

    /// Drop the whole current static namespace. Clearing an absent namespace succeeds.
    pub async fn clear_static(&self) -> Result<bool> {
        let existed = self.store.delete(&self.static_name).await?;
        debug!(namespace = %self.static_name, existed, "Cleared cache");
        Ok(existed)
    }
}

/// Fetch and insist on an ok status
async fn fetch_ok(network: &dyn Network, request: &Request) -> Result<Response> {
    let response = network.fetch(request).await?;
    if response.is_ok() {
        Ok(response)
    } else {
        Err(WorkerError::from_status(
            request.url.as_str(),
            response.status,
            &response.body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::http::CacheKey;
    use crate::testing::FakeNetwork;

    fn small_config() -> WorkerConfig {
        WorkerConfig {
            static_manifest: vec!["/".into(), "/index.html".into(), "/offline.html".into()],
            external_resources: vec![
                "https://unpkg.com/maplibre-gl@4.1.0/dist/maplibre-gl.css".into(),
                "https://unpkg.com/maplibre-gl@4.1.0/dist/maplibre-gl.js".into(),
            ],
            ..WorkerConfig::default()
        }
    }

    fn manager(config: &WorkerConfig) -> (NamespaceManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (NamespaceManager::new(store.clone(), config), store)
    }

    fn serve_manifest(network: &FakeNetwork, config: &WorkerConfig) {
        for path in &config.static_manifest {
            network.respond(config.resolve(path).unwrap().as_str(), 200, format!("body of {path}"));
        }
    }

    #[tokio::test]
    async fn test_provision_stores_every_manifest_entry() {
        let config = small_config();
        let (manager, _) = manager(&config);
        let network = FakeNetwork::new();
        serve_manifest(&network, &config);
        network.respond(&config.external_resources[0], 200, "css");

        let report = manager.provision_on_install(&network, &config).await.unwrap();
        assert_eq!(report.required, 3);
        assert_eq!(report.external_cached, 1);
        assert_eq!(report.external_failed, vec![config.external_resources[1].clone()]);

        let ns = manager.open(NamespaceRole::Static).await.unwrap();
        for path in &config.static_manifest {
            let key = CacheKey::get(&config.resolve(path).unwrap());
            let resp = ns.match_response(&key).await.unwrap().unwrap();
            assert_eq!(resp.text(), format!("body of {path}"));
        }
    }

    #[tokio::test]
    async fn test_provision_fails_when_required_entry_missing() {
        let config = small_config();
        let (manager, _) = manager(&config);
        let network = FakeNetwork::new();
        serve_manifest(&network, &config);
        network.fail(config.resolve("/offline.html").unwrap().as_str());

        let err = manager.provision_on_install(&network, &config).await.unwrap_err();
        match err {
            WorkerError::Install { url, .. } => assert_eq!(url, "https://krux.app/offline.html"),
            other => panic!("unexpected error: {other}"),
        }
        let ns = manager.open(NamespaceRole::Static).await.unwrap();
        assert!(ns.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provision_fails_on_error_status() {
        let config = small_config();
        let (manager, _) = manager(&config);
        let network = FakeNetwork::new();
        serve_manifest(&network, &config);
        network.respond(config.resolve("/index.html").unwrap().as_str(), 404, "gone");

        assert!(matches!(
            manager.provision_on_install(&network, &config).await,
            Err(WorkerError::Install { .. })
        ));
    }

    #[tokio::test]
    async fn test_reconcile_keeps_only_current_generation() {
        let config = small_config();
        let (manager, store) = manager(&config);
        for name in ["krux-cache-v1", "krux-data-v2", "krux-cache-v3", "krux-data-v3", "other-app"] {
            store.open(name).await.unwrap();
        }

        let mut deleted = manager.reconcile_on_activate().await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["krux-cache-v1", "krux-data-v2", "other-app"]);
        assert_eq!(store.names().await.unwrap(), vec!["krux-cache-v3", "krux-data-v3"]);
    }

    #[tokio::test]
    async fn test_clear_static_twice() {
        let config = small_config();
        let (manager, store) = manager(&config);
        let ns = manager.open(NamespaceRole::Static).await.unwrap();
        ns.put(CacheKey::get(&config.resolve("/").unwrap()), Response::new(200, "x"))
            .await
            .unwrap();

        assert!(manager.clear_static().await.unwrap());
        assert!(!manager.clear_static().await.unwrap());
        assert!(!store.has("krux-cache-v3").await.unwrap());
    }
}
