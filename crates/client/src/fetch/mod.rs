//! HTTP fetch pipeline for the offline-sync worker.
//!
//! ### URL Resolution
//! - Root-relative manifest entries resolve against the app origin
//! - Lowercase host, remove fragments, preserve query string
//!
//! ### Response Classification
//! - Responses whose final URL shares the app origin are `basic`; all
//!   others are `cors` and never stored lazily.
//! - Non-success statuses are returned, not raised. Callers decide.

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, is_same_origin, resolve};

use crate::request::{AssetRequest, AssetResponse, ResponseType};
use crate::transport::Transport;
use shellsync_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Origin of the hosted app
    pub origin: ::url::Url,

    /// User agent string (default: "shellsync/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl FetchConfig {
    /// Build fetch settings from the application configuration.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = ::url::Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { origin, user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() })
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            origin: ::url::Url::parse("http://localhost:8080").expect("static origin is valid"),
            user_agent: "shellsync/0.1".to_string(),
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

/// HTTP client bound to the app origin.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkFailure(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn classify(&self, final_url: &::url::Url) -> ResponseType {
        if is_same_origin(&self.config.origin, final_url) { ResponseType::Basic } else { ResponseType::Cors }
    }
}

#[async_trait]
impl Transport for FetchClient {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidUrl(format!("bad method {}: {}", request.method, e)))?;

        let response = self
            .http
            .request(method, request.url.clone())
            .send()
            .await
            .map_err(|e| Error::NetworkFailure(format!("{}: {}", request.url, e)))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::NetworkFailure(format!("failed to read {}: {}", request.url, e)))?;

        let response_type = self.classify(&final_url);

        tracing::debug!(
            "fetched {} -> {} ({}) in {}ms ({} bytes)",
            request.url,
            final_url,
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(AssetResponse { url: final_url.to_string(), status, headers, body, response_type })
    }

    async fn post_json(&self, url: &::url::Url, body: &serde_json::Value) -> Result<u16, Error> {
        let response = self
            .http
            .post(url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::NetworkFailure(format!("{}: {}", url, e)))?;

        Ok(response.status().as_u16())
    }

    async fn get_json(&self, url: &::url::Url) -> Result<serde_json::Value, Error> {
        let response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::NetworkFailure(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteRejection { endpoint: url.to_string(), status: status.as_u16() });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::InvalidPayload(format!("{}: {}", url, e)))
    }
}
