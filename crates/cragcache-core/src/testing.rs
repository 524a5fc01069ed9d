//! Test doubles for the network and the host platform.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, WorkerError};
use crate::host::{ClientInfo, Host};
use crate::http::{Request, Response};
use crate::net::Network;
use crate::notify::{BroadcastMessage, Notification};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(Response),
    Fail,
}

/// Network answering from a script. Unscripted URLs behave as unreachable.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Respond(Response::new(status, body)));
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Scripted::Fail);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        let scripted = self.routes.lock().unwrap().get(&url).cloned();
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail) | None => Err(WorkerError::Network(format!("unreachable: {url}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    SkippedWaiting,
    Claimed,
    Posted(String, BroadcastMessage),
    Shown(Notification),
    Closed(String),
    Focused(String),
    Opened(String),
}

/// Host that records every call.
pub struct RecordingHost {
    clients: Vec<ClientInfo>,
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
    pub fn with_clients(clients: Vec<ClientInfo>) -> Self {
        Self {
            clients,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<(String, BroadcastMessage)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Posted(id, msg) => Some((id, msg)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn skip_waiting(&self) {
        self.record(HostEvent::SkippedWaiting);
    }

    async fn claim_clients(&self) {
        self.record(HostEvent::Claimed);
    }

    async fn clients(&self) -> Vec<ClientInfo> {
        self.clients.clone()
    }

    async fn post_message(&self, client: &ClientInfo, message: &BroadcastMessage) -> Result<()> {
        self.record(HostEvent::Posted(client.id.clone(), message.clone()));
        Ok(())
    }

    async fn show_notification(&self, notification: &Notification) -> Result<()> {
        self.record(HostEvent::Shown(notification.clone()));
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) {
        self.record(HostEvent::Closed(notification.title.clone()));
    }

    async fn focus(&self, client: &ClientInfo) -> Result<()> {
        self.record(HostEvent::Focused(client.id.clone()));
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        self.record(HostEvent::Opened(url.to_string()));
        Ok(())
    }
}
