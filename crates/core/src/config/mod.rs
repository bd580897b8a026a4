//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELLSYNC_*)
//! 2. TOML config file (if SHELLSYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELLSYNC_*, nested keys split on `__`)
/// 2. TOML config file (if SHELLSYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite durable store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the hosted app. Root-relative URLs resolve against it and
    /// only responses from it are cached lazily.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix of the asset cache name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version tag of the current asset cache generation. Bumped on deploy.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// App-shell URLs fetched and stored at install time.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Cached document served when a navigation request can't reach the network.
    #[serde(default = "default_fallback_document")]
    pub fallback_document: String,

    /// Activate a freshly installed version without waiting for a SKIP_WAITING message.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    #[serde(default = "default_resume_sync_endpoint")]
    pub resume_sync_endpoint: String,

    #[serde(default = "default_application_sync_endpoint")]
    pub application_sync_endpoint: String,

    #[serde(default = "default_job_updates_endpoint")]
    pub job_updates_endpoint: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Presentation settings for user-visible notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_push_body")]
    pub default_body: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_badge")]
    pub badge: String,
    /// In-app anchor opened by the "view-results" action.
    #[serde(default = "default_jobs_anchor")]
    pub jobs_anchor: String,
}

/// The immutable description of one deployed version.
///
/// Handed to the lifecycle controller and cache manager at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub cache_name: String,
    pub manifest: Vec<String>,
    pub fallback_document: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellsync.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_prefix() -> String {
    "careerboost".into()
}

fn default_cache_version() -> String {
    "v1.0.0".into()
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/style.css",
        "/script.js",
        "/manifest.json",
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
        "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_fallback_document() -> String {
    "/index.html".into()
}

fn default_resume_sync_endpoint() -> String {
    "/api/sync-resume".into()
}

fn default_application_sync_endpoint() -> String {
    "/api/sync-applications".into()
}

fn default_job_updates_endpoint() -> String {
    "/api/job-updates".into()
}

fn default_user_agent() -> String {
    "shellsync/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_app_name() -> String {
    "CareerBoost".into()
}

fn default_push_body() -> String {
    "New career opportunity available!".into()
}

fn default_icon() -> String {
    "/icons/icon-192.png".into()
}

fn default_badge() -> String {
    "/icons/badge-72.png".into()
}

fn default_jobs_anchor() -> String {
    "/#jobs".into()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            default_body: default_push_body(),
            icon: default_icon(),
            badge: default_badge(),
            jobs_anchor: default_jobs_anchor(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            manifest: default_manifest(),
            fallback_document: default_fallback_document(),
            skip_waiting_on_install: true,
            resume_sync_endpoint: default_resume_sync_endpoint(),
            application_sync_endpoint: default_application_sync_endpoint(),
            job_updates_endpoint: default_job_updates_endpoint(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the live cache generation, e.g. `careerboost-v1.0.0`.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }

    /// Snapshot the release-specific settings.
    pub fn release(&self) -> ReleaseConfig {
        ReleaseConfig {
            cache_name: self.cache_name(),
            manifest: self.manifest.clone(),
            fallback_document: self.fallback_document.clone(),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELLSYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELLSYNC_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
