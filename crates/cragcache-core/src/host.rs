//! The hosting platform as seen by the worker: version adoption, connected
//! page clients and the notification tray.

use async_trait::async_trait;

use crate::error::Result;
use crate::notify::{BroadcastMessage, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Window,
    Worker,
}

/// A page (or worker) connected to this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: String,
    pub url: String,
    pub kind: ClientKind,
}

impl ClientInfo {
    pub fn window(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            kind: ClientKind::Window,
        }
    }
}

#[async_trait]
pub trait Host: Send + Sync {
    /// Adopt the installed version without waiting for old pages to close
    async fn skip_waiting(&self);

    /// Take control of pages that are already open
    async fn claim_clients(&self);

    /// All connected clients, controlled or not
    async fn clients(&self) -> Vec<ClientInfo>;

    async fn post_message(&self, client: &ClientInfo, message: &BroadcastMessage) -> Result<()>;

    async fn show_notification(&self, notification: &Notification) -> Result<()>;

    async fn close_notification(&self, notification: &Notification);

    async fn focus(&self, client: &ClientInfo) -> Result<()>;

    async fn open_window(&self, url: &str) -> Result<()>;
}
