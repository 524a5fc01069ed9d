//! Worker configuration.
//!
//! Holds the versioned namespace naming, the install manifest, the traffic
//! classification markers and the notification defaults.
//!
//! Configuration is stored at `~/.config/cragcache/config.json`; every field
//! falls back to the built-in default when absent.

use std::path::PathBuf;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "cragcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the application origin
pub const ORIGIN_ENV: &str = "CRAGCACHE_ORIGIN";

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "CRAGCACHE_CACHE_DIR";

const DEFAULT_ORIGIN: &str = "https://krux.app";

/// Local application-shell paths that must all be cached for install to succeed.
const STATIC_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/offline.html",
    "/app_2.css",
    "/app_3.js",
    "/auth.js",
    "/firebase-config.js",
    "/maplibre-config.js",
    "/maplibre-map.js",
    "/user-features.js",
    "/route-photos.js",
    "/manifest.json",
    "/favicon.png",
    "/logo_krujx_v2.png",
    "/assets/logo.png",
    "/assets/krux-logo-login.png",
    "/assets/reset-view-icon.png",
    "/icons/climbing-marker.png",
    "/icons/parking_icon.png",
    "/icons/pwa/icon-192x192.png",
    "/icons/pwa/icon-512x512.png",
    "/icons/pwa/apple-touch-icon.png",
    "/capacitor-init.js",
];

/// Cross-origin resources cached on a best-effort basis.
const EXTERNAL_RESOURCES: &[&str] = &[
    "https://unpkg.com/maplibre-gl@4.1.0/dist/maplibre-gl.css",
    "https://unpkg.com/maplibre-gl@4.1.0/dist/maplibre-gl.js",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
];

const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff", ".woff2", ".ttf", ".ico",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Host markers identifying the managed backend. A host matching one of
/// these is never intercepted, unless its host or path contains `exempt`
/// (Google Fonts lives on a googleapis.com subdomain but is a static resource).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendMarker {
    pub host_contains: String,
    /// Matched against the host as well as the path. A path-only check would
    /// bypass `fonts.googleapis.com/css2`, leaving the stylesheet uncached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exempt: Option<String>,
}

impl BackendMarker {
    fn host(host_contains: &str) -> Self {
        Self {
            host_contains: host_contains.to_string(),
            exempt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub url: String,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "KRUX".to_string(),
            body: "New notification from KRUX".to_string(),
            icon: "/icons/pwa/icon-192x192.png".to_string(),
            badge: "/icons/pwa/icon-96x96.png".to_string(),
            vibrate: vec![100, 50, 100],
            url: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the manifest paths are resolved against
    pub origin: String,
    pub cache_prefix: String,
    pub cache_version: String,
    pub static_manifest: Vec<String>,
    pub external_resources: Vec<String>,
    pub offline_path: String,
    /// Application shell served when neither the page nor the offline document is cached
    pub shell_path: String,
    pub backend_markers: Vec<BackendMarker>,
    pub geo_path_markers: Vec<String>,
    pub geo_extensions: Vec<String>,
    pub static_extensions: Vec<String>,
    pub sync_tag: String,
    pub sync_message: String,
    pub notification: NotificationDefaults,
    /// Overrides the platform cache directory when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            cache_prefix: "krux".to_string(),
            cache_version: "v3".to_string(),
            static_manifest: strings(STATIC_MANIFEST),
            external_resources: strings(EXTERNAL_RESOURCES),
            offline_path: "/offline.html".to_string(),
            shell_path: "/index.html".to_string(),
            backend_markers: vec![
                BackendMarker::host("firebase"),
                BackendMarker::host("firebaseio"),
                BackendMarker {
                    host_contains: "googleapis.com".to_string(),
                    exempt: Some("fonts".to_string()),
                },
            ],
            geo_path_markers: strings(&["/Cartografia/", "/tiles/"]),
            geo_extensions: strings(&[".geojson"]),
            static_extensions: strings(STATIC_EXTENSIONS),
            sync_tag: "sync-ascents".to_string(),
            sync_message: "Connection is available to synchronize".to_string(),
            notification: NotificationDefaults::default(),
            cache_dir: None,
        }
    }
}

impl WorkerConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WorkerError::Config("Could not find config directory".into()))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            self.origin = origin;
        }
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| WorkerError::Config("Could not find cache directory".into()))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Current static-asset namespace, e.g. `krux-cache-v3`
    pub fn static_namespace(&self) -> String {
        format!("{}-cache-{}", self.cache_prefix, self.cache_version)
    }

    /// Current dynamic-data namespace, e.g. `krux-data-v3`
    pub fn dynamic_namespace(&self) -> String {
        format!("{}-data-{}", self.cache_prefix, self.cache_version)
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).map_err(|e| WorkerError::InvalidUrl(format!("{}: {e}", self.origin)))
    }

    /// Resolve a manifest path (or absolute URL) against the origin
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| WorkerError::InvalidUrl(format!("{path}: {e}")))
    }

    pub fn offline_url(&self) -> Result<Url> {
        self.resolve(&self.offline_path)
    }

    pub fn shell_url(&self) -> Result<Url> {
        self.resolve(&self.shell_path)
    }
}
