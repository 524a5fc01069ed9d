//! Event router.
//!
//! One entry point per platform event. Handlers share nothing but the
//! injected namespace store, network and host, so any number of them may
//! run at once.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{InstallReport, NamespaceManager, NamespaceStore};
use crate::classify::{classify, Route, Strategy};
use crate::config::WorkerConfig;
use crate::control::{dispatch, ControlMessage, ControlOutcome};
use crate::error::Result;
use crate::fallback::OfflineFallback;
use crate::host::Host;
use crate::http::Request;
use crate::net::Network;
use crate::notify::{self, ClickOutcome, Notification, NotificationClick};
use crate::strategy::{Served, Strategies};

#[derive(Clone)]
pub struct Worker {
    config: Arc<WorkerConfig>,
    manager: NamespaceManager,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    strategies: Strategies,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn NamespaceStore>,
        network: Arc<dyn Network>,
        host: Arc<dyn Host>,
    ) -> Result<Self> {
        let fallback = OfflineFallback::new(&config)?;
        Ok(Self {
            manager: NamespaceManager::new(store, &config),
            strategies: Strategies::new(Arc::clone(&network), fallback),
            config: Arc::new(config),
            network,
            host,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &NamespaceManager {
        &self.manager
    }

    /// Cache the application shell, then ask to be adopted right away.
    /// An error here means this version must not activate.
    pub async fn on_install(&self) -> Result<InstallReport> {
        info!(version = %self.config.cache_version, "Installing");
        let report = self
            .manager
            .provision_on_install(self.network.as_ref(), &self.config)
            .await?;
        self.host.skip_waiting().await;
        info!("Install complete");
        Ok(report)
    }

    /// Evict old generations, then take control of open pages.
    pub async fn on_activate(&self) -> Result<Vec<String>> {
        info!(version = %self.config.cache_version, "Activating");
        let deleted = self.manager.reconcile_on_activate().await?;
        self.host.claim_clients().await;
        info!(deleted = deleted.len(), "Activated");
        Ok(deleted)
    }

    pub fn route(&self, request: &Request) -> Route {
        classify(request, &self.config)
    }

    pub async fn on_fetch(&self, request: Request) -> Result<Served> {
        let route = self.route(&request);
        debug!(method = %request.method, url = %request.url, route = %route, "Intercepted");

        let Route::Intercept(class) = route else {
            return self.strategies.pass_through(request).await;
        };
        let ns = self.manager.open(class.namespace_role()).await?;
        match class.strategy() {
            Strategy::CacheFirstRefresh => self.strategies.cache_first_refresh(ns, request).await,
            Strategy::NetworkFirstWithOfflineFallback => {
                self.strategies
                    .network_first_with_offline_fallback(ns, request)
                    .await
            }
            Strategy::NetworkFirstThenCache => {
                self.strategies.network_first_then_cache(ns, request).await
            }
            Strategy::PassThrough => self.strategies.pass_through(request).await,
        }
    }

    /// Handle a control message from a page. Nothing is sent back; invalid
    /// or failing messages are logged and dropped.
    pub async fn on_message(&self, data: Value) -> Option<ControlOutcome> {
        let message = match ControlMessage::from_value(data) {
            Ok(Some(message)) => message,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed control message");
                return None;
            }
        };
        match dispatch(message, &self.manager, &self.network, self.host.as_ref(), &self.config).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Control message failed");
                None
            }
        }
    }

    /// Background sync fired for `tag`. Returns the number of pages told.
    pub async fn on_sync(&self, tag: &str) -> usize {
        notify::broadcast_sync(self.host.as_ref(), &self.config, tag).await
    }

    pub async fn on_push(&self, data: Option<&[u8]>) -> Result<Option<Notification>> {
        notify::show_push(self.host.as_ref(), &self.config, data).await
    }

    pub async fn on_notification_click(&self, click: NotificationClick) -> Result<ClickOutcome> {
        notify::handle_click(self.host.as_ref(), &self.config, &click).await
    }
}
