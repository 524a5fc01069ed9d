//! Deferred sync signalling and push notifications.
//!
//! Reconnection only produces an advisory `SYNC_AVAILABLE` broadcast; the
//! pages own any queued writes and replay them themselves.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{NotificationDefaults, WorkerConfig};
use crate::error::Result;
use crate::host::{ClientInfo, ClientKind, Host};

/// Messages posted from the worker to every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum BroadcastMessage {
    SyncAvailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PushData {
    #[serde(default)]
    pub url: Option<String>,
}

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    /// Older senders put the target at the top level
    pub url: Option<String>,
    pub data: Option<PushData>,
    pub actions: Option<Vec<NotificationAction>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NotificationData {
    pub url: String,
}

/// A rendered notification, ready for the tray.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn from_payload(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
        let url = payload
            .data
            .and_then(|d| d.url)
            .or(payload.url)
            .unwrap_or_else(|| defaults.url.clone());
        let actions = payload
            .actions
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| {
                vec![
                    NotificationAction::new(ACTION_OPEN, "Open"),
                    NotificationAction::new("close", "Close"),
                ]
            });
        Self {
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
            badge: payload.badge.unwrap_or_else(|| defaults.badge.clone()),
            vibrate: defaults.vibrate.clone(),
            data: NotificationData { url },
            actions,
        }
    }
}

const ACTION_OPEN: &str = "open";

/// A click on a shown notification or one of its action buttons.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    pub notification: Notification,
    /// Empty or absent when the body was clicked rather than a button
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(ClientInfo),
    Opened(String),
    Dismissed,
}

/// Announce to every client that pending writes can be synchronized.
/// Returns how many clients were reached; a tag other than the registered
/// one reaches nobody.
pub async fn broadcast_sync(host: &dyn Host, config: &WorkerConfig, tag: &str) -> usize {
    if tag != config.sync_tag {
        debug!(tag, "Ignoring unknown sync tag");
        return 0;
    }
    info!(tag, "Connection restored, notifying clients");

    let message = BroadcastMessage::SyncAvailable {
        message: config.sync_message.clone(),
    };
    let mut reached = 0;
    for client in host.clients().await {
        match host.post_message(&client, &message).await {
            Ok(()) => reached += 1,
            Err(e) => warn!(client = %client.id, error = %e, "Failed to post sync message"),
        }
    }
    reached
}

/// Turn a push body into a notification. No body means nothing to show.
pub fn render_push(data: Option<&[u8]>, defaults: &NotificationDefaults) -> Result<Option<Notification>> {
    let Some(data) = data else {
        return Ok(None);
    };
    let payload: PushPayload = serde_json::from_slice(data)?;
    Ok(Some(Notification::from_payload(payload, defaults)))
}

/// Show the notification for a push message, if it carries one.
/// An unparsable payload is logged and dropped.
pub async fn show_push(
    host: &dyn Host,
    config: &WorkerConfig,
    data: Option<&[u8]>,
) -> Result<Option<Notification>> {
    let notification = match render_push(data, &config.notification) {
        Ok(Some(notification)) => notification,
        Ok(None) => {
            debug!("Push without payload, nothing to show");
            return Ok(None);
        }
        Err(e) => {
            warn!(error = %e, "Dropping unparsable push payload");
            return Ok(None);
        }
    };
    host.show_notification(&notification).await?;
    info!(title = %notification.title, "Showed push notification");
    Ok(Some(notification))
}

/// Close the notification, then bring the target page forward: focus a
/// window already showing it, or open a new one.
pub async fn handle_click(
    host: &dyn Host,
    config: &WorkerConfig,
    click: &NotificationClick,
) -> Result<ClickOutcome> {
    host.close_notification(&click.notification).await;

    let action = click.action.as_deref().unwrap_or_default();
    if !action.is_empty() && action != ACTION_OPEN {
        return Ok(ClickOutcome::Dismissed);
    }

    let target = &click.notification.data.url;
    // Compare absolute URLs when the target is a path
    let absolute = config
        .resolve(target)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| target.clone());

    let existing = host
        .clients()
        .await
        .into_iter()
        .find(|c| c.kind == ClientKind::Window && (c.url == *target || c.url == absolute));

    if let Some(client) = existing {
        host.focus(&client).await?;
        return Ok(ClickOutcome::Focused(client));
    }
    host.open_window(&absolute).await?;
    Ok(ClickOutcome::Opened(absolute))
}
