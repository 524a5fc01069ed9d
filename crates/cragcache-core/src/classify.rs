//! Request classification.
//!
//! `classify` sorts every intercepted request into a `Route`: either a
//! bypass (straight to the network, never cached) or one of four traffic
//! classes. Rules are checked in a fixed order and the first match wins,
//! so a `.geojson` file is geo data even though its path could also look
//! like a static asset.

use std::fmt;

use reqwest::Method;

use crate::cache::NamespaceRole;
use crate::config::WorkerConfig;
use crate::http::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    GeoData,
    StaticAsset,
    Navigation,
    DynamicOther,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BypassReason {
    NonGet,
    Backend,
    NonHttp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    CacheFirstRefresh,
    NetworkFirstWithOfflineFallback,
    NetworkFirstThenCache,
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Bypass(BypassReason),
    Intercept(TrafficClass),
}

impl TrafficClass {
    pub fn strategy(&self) -> Strategy {
        match self {
            TrafficClass::GeoData | TrafficClass::StaticAsset => Strategy::CacheFirstRefresh,
            TrafficClass::Navigation => Strategy::NetworkFirstWithOfflineFallback,
            TrafficClass::DynamicOther => Strategy::NetworkFirstThenCache,
        }
    }

    /// Namespace the class reads from and writes to. Only geo data lives in
    /// the dynamic namespace; pages and other content share the static one.
    pub fn namespace_role(&self) -> NamespaceRole {
        match self {
            TrafficClass::GeoData => NamespaceRole::Dynamic,
            _ => NamespaceRole::Static,
        }
    }
}

impl Route {
    pub fn strategy(&self) -> Strategy {
        match self {
            Route::Bypass(_) => Strategy::PassThrough,
            Route::Intercept(class) => class.strategy(),
        }
    }

    pub fn class(&self) -> Option<TrafficClass> {
        match self {
            Route::Bypass(_) => None,
            Route::Intercept(class) => Some(*class),
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrafficClass::GeoData => "geo-data",
            TrafficClass::StaticAsset => "static-asset",
            TrafficClass::Navigation => "navigation",
            TrafficClass::DynamicOther => "dynamic-other",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Bypass(reason) => write!(f, "bypass ({:?})", reason),
            Route::Intercept(class) => write!(f, "{}", class),
        }
    }
}

/// Exemptions match host or path, so `fonts.googleapis.com` is intercepted.
fn is_backend(request: &Request, config: &WorkerConfig) -> bool {
    let host = request.url.host_str().unwrap_or_default();
    let path = request.url.path();
    config.backend_markers.iter().any(|marker| {
        host.contains(&marker.host_contains)
            && !marker
                .exempt
                .as_deref()
                .is_some_and(|exempt| host.contains(exempt) || path.contains(exempt))
    })
}

fn is_geo_data(path: &str, config: &WorkerConfig) -> bool {
    config.geo_path_markers.iter().any(|m| path.contains(m.as_str()))
        || config.geo_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
}

fn is_static_asset(path: &str, config: &WorkerConfig) -> bool {
    config
        .static_extensions
        .iter()
        .any(|ext| path.ends_with(ext.as_str()))
}

pub fn classify(request: &Request, config: &WorkerConfig) -> Route {
    if request.method != Method::GET {
        return Route::Bypass(BypassReason::NonGet);
    }
    if is_backend(request, config) {
        return Route::Bypass(BypassReason::Backend);
    }
    if !matches!(request.url.scheme(), "http" | "https") {
        return Route::Bypass(BypassReason::NonHttp);
    }

    let path = request.url.path();
    if is_geo_data(path, config) {
        Route::Intercept(TrafficClass::GeoData)
    } else if is_static_asset(path, config) {
        Route::Intercept(TrafficClass::StaticAsset)
    } else if request.is_navigation() {
        Route::Intercept(TrafficClass::Navigation)
    } else {
        Route::Intercept(TrafficClass::DynamicOther)
    }
}
