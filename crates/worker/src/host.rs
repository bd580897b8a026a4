//! Commands the worker sends back to the page host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shellsync_core::Error;

/// Action id that opens the jobs section.
pub const ACTION_VIEW_RESULTS: &str = "view-results";

/// Action id that only closes the notification.
pub const ACTION_DISMISS: &str = "dismiss";

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    /// Notifications sharing a tag replace each other.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vibrate: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The page-side surface the worker drives.
#[async_trait]
pub trait ClientHost: Send + Sync {
    async fn show_notification(&self, notification: Notification) -> Result<(), Error>;

    /// Open (or focus) a client window at `url`.
    async fn open_window(&self, url: &str) -> Result<(), Error>;

    /// Take control of every open client so the active version serves it.
    async fn claim_clients(&self) -> Result<(), Error>;
}
