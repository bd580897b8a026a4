//! Push, notification-click and periodic job-update handling.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use shellsync_client::Transport;
use shellsync_core::{Error, NotificationConfig};
use url::Url;

use crate::host::{ACTION_DISMISS, ACTION_VIEW_RESULTS, ClientHost, Notification, NotificationAction};

/// Tag shared by job-update summaries so a newer one replaces the last.
pub const JOB_UPDATES_TAG: &str = "job-updates";

const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickRoute {
    Opened(String),
    Dismissed,
}

pub struct NotificationRelay {
    host: Arc<dyn ClientHost>,
    transport: Arc<dyn Transport>,
    config: NotificationConfig,
    job_updates: Url,
}

impl NotificationRelay {
    pub fn new(
        host: Arc<dyn ClientHost>, transport: Arc<dyn Transport>, config: NotificationConfig, job_updates: Url,
    ) -> Self {
        Self { host, transport, config, job_updates }
    }

    fn base(&self, title: String, body: String) -> Notification {
        Notification {
            title,
            body,
            icon: Some(self.config.icon.clone()),
            badge: Some(self.config.badge.clone()),
            tag: None,
            vibrate: VIBRATE_PATTERN.to_vec(),
            actions: Vec::new(),
            data: None,
        }
    }

    /// Show a notification for a push message.
    ///
    /// A missing or blank payload uses the configured default body.
    pub async fn on_push(&self, payload: Option<&str>) -> Result<Notification, Error> {
        let body = match payload.map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => self.config.default_body.clone(),
        };

        let notification = Notification {
            actions: vec![
                NotificationAction { action: ACTION_VIEW_RESULTS.into(), title: "View Jobs".into() },
                NotificationAction { action: ACTION_DISMISS.into(), title: "Close".into() },
            ],
            data: Some(json!({ "arrived_at": Utc::now().to_rfc3339() })),
            ..self.base(self.config.app_name.clone(), body)
        };
        self.host.show_notification(notification.clone()).await?;
        Ok(notification)
    }

    /// Route a click by its action id. No action means the body was clicked.
    pub async fn on_notification_click(&self, action: Option<&str>) -> Result<ClickRoute, Error> {
        let target = match action {
            Some(ACTION_DISMISS) => return Ok(ClickRoute::Dismissed),
            Some(ACTION_VIEW_RESULTS) => self.config.jobs_anchor.clone(),
            Some(other) => {
                tracing::debug!(action = other, "unknown notification action, opening root");
                "/".to_string()
            }
            None => "/".to_string(),
        };
        self.host.open_window(&target).await?;
        Ok(ClickRoute::Opened(target))
    }

    /// Poll the job-updates endpoint and summarize any new jobs.
    ///
    /// Returns how many jobs were reported.
    pub async fn check_job_updates(&self) -> Result<usize, Error> {
        let value = self.transport.get_json(&self.job_updates).await?;
        let Some(jobs) = value.as_array() else {
            return Err(Error::InvalidPayload(format!("{} did not return an array", self.job_updates.path())));
        };
        if jobs.is_empty() {
            tracing::debug!("no new jobs");
            return Ok(0);
        }

        let notification = Notification {
            tag: Some(JOB_UPDATES_TAG.into()),
            ..self.base("New Job Opportunities!".into(), format!("{} new jobs matching your profile", jobs.len()))
        };
        self.host.show_notification(notification).await?;
        Ok(jobs.len())
    }
}
