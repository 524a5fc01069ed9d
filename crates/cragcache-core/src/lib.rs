//! Offline caching core for the KRUX climbing guide.
//!
//! This crate holds the request interception and caching logic of the
//! application's offline layer: traffic classification, versioned cache
//! namespaces, fetch strategies with offline fallbacks, page control
//! messages, background sync signalling and push notifications. Storage,
//! network and the hosting platform are injected behind traits so that
//! every frontend drives the same [`Worker`].

pub mod cache;
pub mod classify;
pub mod config;
pub mod control;
pub mod error;
pub mod fallback;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod notify;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachedEntry, DiskStore, MemoryStore, Namespace, NamespaceManager, NamespaceRole, NamespaceStore};
pub use classify::{classify, Route, Strategy, TrafficClass};
pub use config::WorkerConfig;
pub use control::{ControlMessage, ControlOutcome};
pub use error::{Result, WorkerError};
pub use host::{ClientInfo, ClientKind, Host};
pub use http::{CacheKey, Request, RequestMode, Response};
pub use lifecycle::{Phase, Registration};
pub use net::{HttpNetwork, Network};
pub use notify::{BroadcastMessage, ClickOutcome, Notification, NotificationClick};
pub use strategy::{Served, Source};
pub use worker::Worker;
