//! Intercepted requests and the responses handed back to the page.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shellsync_core::CachedAsset;
use shellsync_core::store::hash::compute_request_key;
use url::Url;

/// What the page intends to do with a fetched resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// A page navigation.
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Other,
}

/// A request intercepted by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: Url,
    #[serde(default)]
    pub destination: Destination,
}

fn default_method() -> String {
    "GET".into()
}

impl AssetRequest {
    /// A plain GET for a sub-resource.
    pub fn get(url: Url) -> Self {
        Self { method: default_method(), url, destination: Destination::Other }
    }

    /// A GET for a page navigation.
    pub fn navigation(url: Url) -> Self {
        Self { method: default_method(), url, destination: Destination::Document }
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    /// Key under which the response is stored in a cache generation.
    ///
    /// The fragment never reaches the server, so it is not part of the key.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        compute_request_key(&self.method, url.as_str())
    }
}

/// How the response relates to the app origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response with readable body.
    Cors,
}

/// A response returned to the page, from the network or a cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub response_type: ResponseType,
}

impl AssetResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete same-origin responses are stored lazily.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }

    /// Copy this response into a storable cache entry for `request`.
    pub fn to_cached(&self, request: &AssetRequest, stored_at: String) -> CachedAsset {
        CachedAsset {
            request_key: request.cache_key(),
            method: request.method.to_ascii_uppercase(),
            url: request.url.to_string(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.to_vec(),
            stored_at,
        }
    }
}

impl From<CachedAsset> for AssetResponse {
    fn from(asset: CachedAsset) -> Self {
        Self {
            url: asset.url,
            status: asset.status,
            headers: asset.headers,
            body: Bytes::from(asset.body),
            response_type: ResponseType::Basic,
        }
    }
}
