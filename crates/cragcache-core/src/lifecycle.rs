//! Version adoption, driven the way a host drives a newly registered worker.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::InstallReport;
use crate::control::ControlOutcome;
use crate::error::{Result, WorkerError};
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parsed,
    Installing,
    /// Installed and waiting to activate
    Installed,
    Activating,
    Activated,
    /// Install failed; this version will never activate
    Redundant,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Parsed => "parsed",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Activated => "activated",
            Phase::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

pub struct Registration {
    worker: Arc<Worker>,
    phase: RwLock<Phase>,
}

impl Registration {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self {
            worker,
            phase: RwLock::new(Phase::Parsed),
        }
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.read().await
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    async fn set_phase(&self, phase: Phase) {
        *self.phase.write().await = phase;
    }

    pub async fn install(&self) -> Result<InstallReport> {
        self.set_phase(Phase::Installing).await;
        match self.worker.on_install().await {
            Ok(report) => {
                self.set_phase(Phase::Installed).await;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Install failed, version is redundant");
                self.set_phase(Phase::Redundant).await;
                Err(e)
            }
        }
    }

    /// Activate an installed version. A failed activation leaves it waiting.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let phase = self.phase().await;
        if phase != Phase::Installed {
            return Err(WorkerError::InvalidState(format!("Cannot activate a {phase} version")));
        }
        self.set_phase(Phase::Activating).await;
        match self.worker.on_activate().await {
            Ok(deleted) => {
                self.set_phase(Phase::Activated).await;
                Ok(deleted)
            }
            Err(e) => {
                self.set_phase(Phase::Installed).await;
                Err(e)
            }
        }
    }

    /// Activate a waiting version now. Returns `None` when nothing is waiting.
    pub async fn skip_waiting(&self) -> Result<Option<Vec<String>>> {
        let phase = self.phase().await;
        if phase != Phase::Installed {
            debug!(phase = %phase, "Nothing waiting to activate");
            return Ok(None);
        }
        self.activate().await.map(Some)
    }

    /// Deliver a page message to the worker. `SKIP_WAITING` also activates
    /// a version that is installed and waiting.
    pub async fn on_message(&self, data: Value) -> Option<ControlOutcome> {
        let outcome = self.worker.on_message(data).await;
        if outcome == Some(ControlOutcome::SkippedWaiting) {
            if let Err(e) = self.skip_waiting().await {
                warn!(error = %e, "Activation after skip waiting failed");
            }
        }
        outcome
    }

    /// Install and, since install always asks to skip waiting, activate.
    pub async fn register(&self) -> Result<InstallReport> {
        let report = self.install().await?;
        let deleted = self.activate().await?;
        info!(
            version = %self.worker.config().cache_version,
            evicted = deleted.len(),
            "Version active"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, NamespaceRole, NamespaceStore};
    use crate::config::WorkerConfig;
    use crate::http::CacheKey;
    use crate::testing::{FakeNetwork, HostEvent, RecordingHost};

    fn setup(manifest: &[&str]) -> (Registration, Arc<MemoryStore>, Arc<FakeNetwork>, Arc<RecordingHost>) {
        let config = WorkerConfig {
            static_manifest: manifest.iter().map(|s| s.to_string()).collect(),
            external_resources: vec!["https://unpkg.com/maplibre-gl@4.1.0/dist/maplibre-gl.css".into()],
            ..WorkerConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let network = Arc::new(FakeNetwork::new());
        let host = Arc::new(RecordingHost::with_clients(vec![]));
        let worker = Worker::new(config, store.clone(), network.clone(), host.clone()).unwrap();
        (Registration::new(Arc::new(worker)), store, network, host)
    }

    #[tokio::test]
    async fn test_failed_required_asset_never_activates() {
        let (registration, store, network, host) = setup(&["/", "/offline.html"]);
        store.open("krux-cache-v2").await.unwrap();
        network.respond("https://krux.app/", 200, "root");
        // offline.html unreachable

        assert!(registration.register().await.is_err());
        assert_eq!(registration.phase().await, Phase::Redundant);
        assert!(registration.activate().await.is_err());

        // Activation never ran: the old generation is intact and no page was claimed
        assert!(store.has("krux-cache-v2").await.unwrap());
        assert!(!host.events().contains(&HostEvent::Claimed));
    }

    #[tokio::test]
    async fn test_successful_register_leaves_current_generation() {
        let (registration, store, network, _host) = setup(&["/", "/offline.html"]);
        for name in ["krux-cache-v1", "krux-cache-v2", "krux-data-v2"] {
            store.open(name).await.unwrap();
        }
        network.respond("https://krux.app/", 200, "root");
        network.respond("https://krux.app/offline.html", 200, "offline");

        let report = registration.register().await.unwrap();
        assert_eq!(report.required, 2);
        assert_eq!(report.external_failed.len(), 1);
        assert_eq!(registration.phase().await, Phase::Activated);

        assert_eq!(store.names().await.unwrap(), vec!["krux-cache-v3", "krux-data-v3"]);

        let ns = registration.worker().namespaces().open(NamespaceRole::Static).await.unwrap();
        let config = registration.worker().config();
        for path in &config.static_manifest {
            let key = CacheKey::get(&config.resolve(path).unwrap());
            assert!(ns.get(&key).await.unwrap().is_some(), "{path} missing");
        }
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let (registration, _, _, _) = setup(&["/"]);
        assert!(matches!(
            registration.activate().await,
            Err(WorkerError::InvalidState(_))
        ));
        assert_eq!(registration.phase().await, Phase::Parsed);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_waiting_version() {
        let (registration, store, network, host) = setup(&["/"]);
        store.open("krux-cache-v2").await.unwrap();
        network.respond("https://krux.app/", 200, "root");

        registration.install().await.unwrap();
        assert_eq!(registration.phase().await, Phase::Installed);
        assert!(store.has("krux-cache-v2").await.unwrap());

        let outcome = registration
            .on_message(serde_json::json!({"type": "SKIP_WAITING"}))
            .await;
        assert_eq!(outcome, Some(ControlOutcome::SkippedWaiting));
        assert_eq!(registration.phase().await, Phase::Activated);
        assert!(!store.has("krux-cache-v2").await.unwrap());
        assert!(host.events().contains(&HostEvent::Claimed));
    }

    #[tokio::test]
    async fn test_skip_waiting_without_waiting_version() {
        let (registration, _, _, host) = setup(&["/"]);
        assert_eq!(registration.skip_waiting().await.unwrap(), None);
        assert_eq!(registration.phase().await, Phase::Parsed);

        let outcome = registration
            .on_message(serde_json::json!({"type": "SKIP_WAITING"}))
            .await;
        assert_eq!(outcome, Some(ControlOutcome::SkippedWaiting));
        assert_eq!(registration.phase().await, Phase::Parsed);
        assert!(!host.events().contains(&HostEvent::Claimed));
    }
}
