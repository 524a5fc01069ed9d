//! Control messages sent by the page.
//!
//! Commands are fire-and-forget: nothing is sent back, and bulk commands
//! cache each URL independently so one bad URL never stops the rest.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{NamespaceHandle, NamespaceManager, NamespaceRole};
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::host::Host;
use crate::http::Request;
use crate::net::Network;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ControlMessage {
    SkipWaiting,
    CacheGeojson {
        #[serde(default)]
        urls: Vec<String>,
    },
    ClearCache,
    PrecacheRoutes {
        #[serde(default)]
        routes: Vec<String>,
    },
}

const KNOWN_TYPES: &[&str] = &["SKIP_WAITING", "CACHE_GEOJSON", "CLEAR_CACHE", "PRECACHE_ROUTES"];

impl ControlMessage {
    /// Parse a raw message. Unknown command types yield `None` so newer
    /// pages can talk to older workers.
    pub fn parse(raw: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Option<Self>> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkerError::InvalidMessage("missing \"type\" field".into()))?;
        if !KNOWN_TYPES.contains(&kind) {
            debug!(kind, "Ignoring unknown control message");
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

/// What a handled command did, for logging and tests. Never sent to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    SkippedWaiting,
    Cached { stored: usize, failed: usize },
    Cleared { existed: bool },
}

pub async fn dispatch(
    message: ControlMessage,
    manager: &NamespaceManager,
    network: &Arc<dyn Network>,
    host: &dyn Host,
    config: &WorkerConfig,
) -> Result<ControlOutcome> {
    match message {
        ControlMessage::SkipWaiting => {
            host.skip_waiting().await;
            Ok(ControlOutcome::SkippedWaiting)
        }
        ControlMessage::CacheGeojson { urls } => {
            let ns = manager.open(NamespaceRole::Dynamic).await?;
            Ok(cache_each(&ns, network, config, &urls, false).await)
        }
        ControlMessage::PrecacheRoutes { routes } => {
            let ns = manager.open(NamespaceRole::Dynamic).await?;
            Ok(cache_each(&ns, network, config, &routes, true).await)
        }
        ControlMessage::ClearCache => {
            let existed = manager.clear_static().await?;
            info!(existed, "Cache cleared");
            Ok(ControlOutcome::Cleared { existed })
        }
    }
}

async fn cache_each(
    ns: &NamespaceHandle,
    network: &Arc<dyn Network>,
    config: &WorkerConfig,
    urls: &[String],
    log_success: bool,
) -> ControlOutcome {
    let results = join_all(urls.iter().map(|url| async move {
        let result = cache_one(ns, network.as_ref(), config, url).await;
        match &result {
            Ok(true) if log_success => info!(url = %url, "Precached route"),
            Ok(true) => debug!(url = %url, namespace = ns.name(), "Cached on request"),
            Ok(false) => debug!(url = %url, "Not cached, response was not ok"),
            Err(e) => warn!(url = %url, error = %e, "Failed to cache on request"),
        }
        matches!(result, Ok(true))
    }))
    .await;

    let stored = results.iter().filter(|stored| **stored).count();
    ControlOutcome::Cached {
        stored,
        failed: results.len() - stored,
    }
}

/// Fetch one URL and store it when ok. Returns whether it was stored.
async fn cache_one(
    ns: &NamespaceHandle,
    network: &dyn Network,
    config: &WorkerConfig,
    url: &str,
) -> Result<bool> {
    let request = Request::from_url(config.resolve(url)?);
    let response = network.fetch(&request).await?;
    if !response.is_ok() {
        return Ok(false);
    }
    ns.put(request.key(), response).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::http::{CacheKey, Response};
    use crate::testing::{FakeNetwork, HostEvent, RecordingHost};

    struct Fixture {
        manager: NamespaceManager,
        network: Arc<FakeNetwork>,
        host: RecordingHost,
        config: WorkerConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let config = WorkerConfig::default();
            Self {
                manager: NamespaceManager::new(Arc::new(MemoryStore::new()), &config),
                network: Arc::new(FakeNetwork::new()),
                host: RecordingHost::with_clients(vec![]),
                config,
            }
        }

        async fn send(&self, raw: &str) -> Result<Option<ControlOutcome>> {
            let Some(message) = ControlMessage::parse(raw)? else {
                return Ok(None);
            };
            let network: Arc<dyn Network> = self.network.clone();
            dispatch(message, &self.manager, &network, &self.host, &self.config)
                .await
                .map(Some)
        }

        fn key(&self, path: &str) -> CacheKey {
            CacheKey::get(&self.config.resolve(path).unwrap())
        }
    }

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            ControlMessage::parse(r#"{"type":"SKIP_WAITING"}"#).unwrap(),
            Some(ControlMessage::SkipWaiting)
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type":"CACHE_GEOJSON","urls":["/a.geojson"]}"#).unwrap(),
            Some(ControlMessage::CacheGeojson {
                urls: vec!["/a.geojson".into()]
            })
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type":"PRECACHE_ROUTES"}"#).unwrap(),
            Some(ControlMessage::PrecacheRoutes { routes: vec![] })
        );
    }

    #[test]
    fn test_parse_unknown_and_malformed() {
        assert_eq!(ControlMessage::parse(r#"{"type":"REFRESH_TILES"}"#).unwrap(), None);
        assert!(ControlMessage::parse(r#"{"urls":[]}"#).is_err());
        assert!(ControlMessage::parse("not json").is_err());
        assert!(ControlMessage::parse(r#"{"type":"CACHE_GEOJSON","urls":"x"}"#).is_err());
    }

    #[test]
    fn test_wire_format_round_trip() {
        let json = serde_json::to_string(&ControlMessage::ClearCache).unwrap();
        assert_eq!(json, r#"{"type":"CLEAR_CACHE"}"#);
    }

    #[tokio::test]
    async fn test_skip_waiting_signals_host() {
        let fx = Fixture::new();
        let outcome = fx.send(r#"{"type":"SKIP_WAITING"}"#).await.unwrap();
        assert_eq!(outcome, Some(ControlOutcome::SkippedWaiting));
        assert_eq!(fx.host.events(), vec![HostEvent::SkippedWaiting]);
    }

    #[tokio::test]
    async fn test_cache_geojson_is_best_effort_per_url() {
        let fx = Fixture::new();
        fx.network.respond("https://krux.app/Cartografia/a.geojson", 200, "a");
        fx.network.respond("https://krux.app/Cartografia/b.geojson", 500, "boom");
        // c is unreachable

        let outcome = fx
            .send(r#"{"type":"CACHE_GEOJSON","urls":["/Cartografia/a.geojson","/Cartografia/b.geojson","/Cartografia/c.geojson"]}"#)
            .await
            .unwrap();
        assert_eq!(outcome, Some(ControlOutcome::Cached { stored: 1, failed: 2 }));

        let ns = fx.manager.open(NamespaceRole::Dynamic).await.unwrap();
        assert_eq!(ns.keys().await.unwrap(), vec![fx.key("/Cartografia/a.geojson")]);
    }

    #[tokio::test]
    async fn test_precache_routes_into_dynamic_namespace() {
        let fx = Fixture::new();
        fx.network.respond("https://krux.app/routes/44", 200, "route 44");

        fx.send(r#"{"type":"PRECACHE_ROUTES","routes":["https://krux.app/routes/44"]}"#)
            .await
            .unwrap();

        let dynamic = fx.manager.open(NamespaceRole::Dynamic).await.unwrap();
        let resp = dynamic.match_response(&fx.key("/routes/44")).await.unwrap().unwrap();
        assert_eq!(resp.text(), "route 44");
        let static_ns = fx.manager.open(NamespaceRole::Static).await.unwrap();
        assert!(static_ns.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cache_twice_leaves_namespace_empty() {
        let fx = Fixture::new();
        let ns = fx.manager.open(NamespaceRole::Static).await.unwrap();
        ns.put(fx.key("/index.html"), Response::new(200, "<html>")).await.unwrap();

        let first = fx.send(r#"{"type":"CLEAR_CACHE"}"#).await.unwrap();
        assert_eq!(first, Some(ControlOutcome::Cleared { existed: true }));
        let second = fx.send(r#"{"type":"CLEAR_CACHE"}"#).await.unwrap();
        assert_eq!(second, Some(ControlOutcome::Cleared { existed: false }));

        let reopened = fx.manager.open(NamespaceRole::Static).await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_is_a_no_op() {
        let fx = Fixture::new();
        assert_eq!(fx.send(r#"{"type":"PING"}"#).await.unwrap(), None);
        assert!(fx.host.events().is_empty());
        assert!(fx.network.calls().is_empty());
    }
}
