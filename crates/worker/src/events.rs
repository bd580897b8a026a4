//! Events the host delivers to the worker, and page messages.

use serde::{Deserialize, Serialize};
use shellsync_client::AssetRequest;
use shellsync_core::ReleaseConfig;

/// One host event. Each is dispatched as its own task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Install a release; the configured release when none is given.
    Install {
        #[serde(default)]
        release: Option<ReleaseConfig>,
    },
    Activate,
    Fetch {
        request: AssetRequest,
    },
    Sync {
        tag: String,
    },
    PeriodicSync {
        tag: String,
    },
    Push {
        #[serde(default)]
        payload: Option<String>,
    },
    NotificationClick {
        #[serde(default)]
        action: Option<String>,
    },
    /// A message posted by a page. Unrecognized messages are ignored.
    Message {
        data: serde_json::Value,
    },
    ConnectivityRestored,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Install { .. } => "install",
            Event::Activate => "activate",
            Event::Fetch { .. } => "fetch",
            Event::Sync { .. } => "sync",
            Event::PeriodicSync { .. } => "periodic_sync",
            Event::Push { .. } => "push",
            Event::NotificationClick { .. } => "notification_click",
            Event::Message { .. } => "message",
            Event::ConnectivityRestored => "connectivity_restored",
        }
    }
}

/// Messages a page posts to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
    CacheResume {
        #[serde(rename = "resumeData")]
        resume_data: serde_json::Value,
    },
    QueueApplication {
        application: serde_json::Value,
    },
}

impl WorkerMessage {
    /// Parse a posted message, `None` for anything unrecognized.
    pub fn from_value(data: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}
