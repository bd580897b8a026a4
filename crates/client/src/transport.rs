//! The network seam used by the cache manager, sync coordinator and
//! notification relay.

use async_trait::async_trait;
use shellsync_core::Error;
use url::Url;

use crate::request::{AssetRequest, AssetResponse};

/// Network operations the worker performs.
///
/// [`FetchClient`](crate::FetchClient) implements this over reqwest; tests
/// substitute in-memory fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a resource. Any HTTP status is a successful fetch; only a
    /// transport-level failure is an error.
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, Error>;

    /// POST a JSON body and return the response status.
    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> Result<u16, Error>;

    /// GET a JSON document. Non-2xx statuses are `RemoteRejection`s.
    async fn get_json(&self, url: &Url) -> Result<serde_json::Value, Error>;
}
