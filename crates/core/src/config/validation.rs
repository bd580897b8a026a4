//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent`, `cache_prefix` or `cache_version` is empty
    /// - `origin` is not an http(s) URL
    /// - an endpoint or the fallback document is empty
    ///
    /// Returns `ConfigError::Missing` if the manifest is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        for (field, value) in [
            ("user_agent", &self.user_agent),
            ("cache_prefix", &self.cache_prefix),
            ("cache_version", &self.cache_version),
            ("fallback_document", &self.fallback_document),
            ("resume_sync_endpoint", &self.resume_sync_endpoint),
            ("application_sync_endpoint", &self.application_sync_endpoint),
            ("job_updates_endpoint", &self.job_updates_endpoint),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            Ok(origin) => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("unsupported origin: {origin}"),
                });
            }
            Err(e) => return Err(ConfigError::Invalid { field: "origin".into(), reason: e.to_string() }),
        }

        if self.manifest.is_empty() {
            return Err(ConfigError::Missing {
                field: "manifest".into(),
                hint: "List the app-shell URLs in SHELLSYNC_CONFIG_FILE".into(),
            });
        }

        if !self.manifest.iter().any(|entry| entry == &self.fallback_document) {
            tracing::warn!(
                fallback_document = %self.fallback_document,
                "fallback document is not part of the install manifest; \
                 offline navigations will fail until it is fetched once"
            );
        }

        Ok(())
    }
}
