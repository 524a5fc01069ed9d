//! A host for running the worker outside a browser.
//!
//! There are no pages to control, so lifecycle calls are logged and
//! anything meant for a page or the notification tray goes to stdout.

use async_trait::async_trait;
use tracing::info;

use cragcache_core::error::Result;
use cragcache_core::{BroadcastMessage, ClientInfo, Host, Notification};

#[derive(Default)]
pub struct ConsoleHost {
    clients: Vec<ClientInfo>,
}

impl ConsoleHost {
    /// Pretend these pages are open, so broadcasts and clicks have somewhere to go.
    pub fn with_clients(clients: Vec<ClientInfo>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl Host for ConsoleHost {
    async fn skip_waiting(&self) {
        info!("Skip waiting requested");
    }

    async fn claim_clients(&self) {
        info!(clients = self.clients.len(), "Claimed clients");
    }

    async fn clients(&self) -> Vec<ClientInfo> {
        self.clients.clone()
    }

    async fn post_message(&self, client: &ClientInfo, message: &BroadcastMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        println!("-> {}: {}", client.id, json);
        Ok(())
    }

    async fn show_notification(&self, notification: &Notification) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(notification)?);
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) {
        info!(title = %notification.title, "Closed notification");
    }

    async fn focus(&self, client: &ClientInfo) -> Result<()> {
        println!("focus {} ({})", client.id, client.url);
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        println!("open {}", url);
        Ok(())
    }
}
