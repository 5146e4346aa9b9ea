//! Push notifications shown by the agent.

use hashbrown::HashMap;
use lantern_common::NotificationDefaults;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Action id that closes a notification without opening anything.
pub const DISMISS_ACTION: &str = "dismiss";

/// Action id that opens the notification's page.
pub const EXPLORE_ACTION: &str = "explore";

/// Unique identifier for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Push message body. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse push data; missing or unparseable data yields an empty payload.
    pub fn parse(data: Option<&[u8]>) -> Self {
        let Some(data) = data else {
            return Self::default();
        };
        serde_json::from_slice(data).unwrap_or_else(|e| {
            warn!(error = %e, "Push payload is not JSON, using defaults");
            Self::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Page to open on click, relative to the origin.
    pub url: String,
}

/// A displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build a notification from a push payload, filling gaps from `defaults`.
    pub fn from_push(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
        Self {
            id: NotificationId::new(),
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            data: NotificationData {
                url: payload.url.unwrap_or_else(|| defaults.url.clone()),
            },
            actions: vec![
                NotificationAction {
                    action: EXPLORE_ACTION.to_string(),
                    title: "Open tutorial".to_string(),
                },
                NotificationAction {
                    action: DISMISS_ACTION.to_string(),
                    title: "Dismiss".to_string(),
                },
            ],
        }
    }
}

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismissed,
    /// An existing window showing the target was focused.
    Focused(String),
    /// A new window was opened.
    Opened(String),
}

/// Currently displayed notifications.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: HashMap<NotificationId, Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, notification: Notification) {
        self.shown.insert(notification.id, notification);
    }

    /// Close a notification. Returns it if it was still showing.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        self.shown.remove(&id)
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.get(&id)
    }

    pub fn visible(&self) -> Vec<&Notification> {
        self.shown.values().collect()
    }
}
