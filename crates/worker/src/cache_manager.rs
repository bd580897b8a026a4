//! Cache-first resolution over one versioned asset cache generation.
//!
//! A [`CacheManager`] is bound to a single [`ReleaseConfig`]: it reads and
//! populates that release's generation, warms it from the install manifest,
//! and evicts every other generation when its release activates.

use std::sync::Arc;

use chrono::Utc;
use shellsync_client::{AssetRequest, AssetResponse, Transport, resolve};
use shellsync_core::{Error, ReleaseConfig, StoreDb};
use tokio::task::JoinHandle;
use url::Url;

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the live generation without touching the network.
    Cache,
    /// Fetched from the network.
    Network,
    /// Network failed for a navigation; served the cached root document.
    Fallback,
}

/// A resolved request.
///
/// `population` is the background store of a freshly fetched response. The
/// response is usable before it finishes.
#[derive(Debug)]
pub struct Resolution {
    pub response: AssetResponse,
    pub source: ResponseSource,
    pub population: Option<JoinHandle<()>>,
}

/// Cache manager for one release's asset generation.
pub struct CacheManager {
    db: StoreDb,
    transport: Arc<dyn Transport>,
    release: ReleaseConfig,
    origin: Url,
}

impl CacheManager {
    pub fn new(db: StoreDb, transport: Arc<dyn Transport>, release: ReleaseConfig, origin: Url) -> Self {
        Self { db, transport, release, origin }
    }

    /// Name of the generation this manager serves.
    pub fn cache_name(&self) -> &str {
        &self.release.cache_name
    }

    pub fn release(&self) -> &ReleaseConfig {
        &self.release
    }

    /// Resolve a request cache-first.
    ///
    /// A hit never touches the network. A miss fetches; complete same-origin
    /// GET responses are stored after the response is handed back. A failed
    /// navigation falls back to the cached root document; any other failure
    /// propagates unchanged.
    pub async fn resolve(&self, request: &AssetRequest) -> Result<Resolution, Error> {
        let key = request.cache_key();
        match self.db.match_asset(&self.release.cache_name, &key).await {
            Ok(Some(asset)) => {
                tracing::debug!("serving {} from {}", request.url, self.release.cache_name);
                return Ok(Resolution { response: asset.into(), source: ResponseSource::Cache, population: None });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, url = %request.url, "cache lookup failed, trying network"),
        }

        match self.transport.fetch(request).await {
            Ok(response) => {
                let population = (response.is_cacheable() && request.method.eq_ignore_ascii_case("GET"))
                    .then(|| self.spawn_store(request, &response));
                Ok(Resolution { response, source: ResponseSource::Network, population })
            }
            Err(err) if request.is_navigation() => match self.fallback_document().await {
                Some(response) => {
                    tracing::debug!("network failed for {}, serving fallback document", request.url);
                    Ok(Resolution { response, source: ResponseSource::Fallback, population: None })
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    fn spawn_store(&self, request: &AssetRequest, response: &AssetResponse) -> JoinHandle<()> {
        let db = self.db.clone();
        let cache_name = self.release.cache_name.clone();
        let asset = response.to_cached(request, Utc::now().to_rfc3339());
        tokio::spawn(async move {
            if let Err(e) = db.put_asset(&cache_name, &asset).await {
                tracing::warn!(error = %e, url = %asset.url, "failed to store fetched asset");
            }
        })
    }

    async fn fallback_document(&self) -> Option<AssetResponse> {
        let url = resolve(&self.origin, &self.release.fallback_document).ok()?;
        let key = AssetRequest::get(url).cache_key();
        match self.db.match_asset(&self.release.cache_name, &key).await {
            Ok(found) => found.map(AssetResponse::from),
            Err(e) => {
                tracing::warn!(error = %e, "fallback document lookup failed");
                None
            }
        }
    }

    /// Fetch and store every manifest entry into this generation.
    ///
    /// Stops at the first entry that fails to fetch or returns a non-success
    /// status. Entries stored before the failure stay cached.
    pub async fn warm(&self, manifest: &[String]) -> Result<usize, Error> {
        self.db.open_cache(&self.release.cache_name).await?;

        for entry in manifest {
            let url = resolve(&self.origin, entry)
                .map_err(|e| Error::CacheWarmFailure { url: entry.clone(), reason: e.to_string() })?;
            let request = AssetRequest::get(url);

            let response = self
                .transport
                .fetch(&request)
                .await
                .map_err(|e| Error::CacheWarmFailure { url: entry.clone(), reason: e.to_string() })?;
            if !response.is_success() {
                return Err(Error::CacheWarmFailure { url: entry.clone(), reason: format!("status {}", response.status) });
            }

            self.db
                .put_asset(&self.release.cache_name, &response.to_cached(&request, Utc::now().to_rfc3339()))
                .await?;
        }

        tracing::info!(cache = %self.release.cache_name, entries = manifest.len(), "cached app shell");
        Ok(manifest.len())
    }

    /// Delete every generation except `live`. Idempotent.
    pub async fn evict_generations_except(&self, live: &str) -> Result<Vec<String>, Error> {
        let deleted = self.db.delete_caches_except(live).await?;
        for name in &deleted {
            tracing::info!(cache = %name, "deleted old cache");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, memory_db, origin, release, url};
    use shellsync_client::ResponseType;

    async fn manager(transport: Arc<FakeTransport>, cache_name: &str) -> (CacheManager, StoreDb) {
        let db = memory_db().await;
        let manager = CacheManager::new(db.clone(), transport, release(cache_name, &["/", "/index.html"]), origin());
        (manager, db)
    }

    #[tokio::test]
    async fn test_hit_skips_network() {
        let transport = FakeTransport::new();
        transport.serve(&url("/style.css"), "body{}");
        let (manager, _db) = manager(transport.clone(), "careerboost-v1").await;
        let request = AssetRequest::get(url("/style.css"));

        let first = manager.resolve(&request).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        first.population.unwrap().await.unwrap();
        assert_eq!(transport.fetch_count(), 1);

        transport.go_offline();
        let second = manager.resolve(&request).await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response.body.as_ref(), b"body{}");
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fragment_hits_stored_entry() {
        let transport = FakeTransport::new();
        transport.serve(&url("/style.css"), "body{}");
        let (manager, _db) = manager(transport.clone(), "careerboost-v1").await;
        let stored = manager.resolve(&AssetRequest::get(url("/style.css"))).await.unwrap();
        stored.population.unwrap().await.unwrap();

        transport.go_offline();
        let anchored = manager.resolve(&AssetRequest::get(url("/style.css#v"))).await.unwrap();
        assert_eq!(anchored.source, ResponseSource::Cache);
        assert_eq!(anchored.response.body.as_ref(), b"body{}");
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_cross_origin_miss_not_stored() {
        let transport = FakeTransport::new();
        let font = Url::parse("https://fonts.googleapis.com/css2?family=Inter").unwrap();
        transport.serve(&font, "@font-face{}");
        let (manager, db) = manager(transport.clone(), "c").await;

        let resolution = manager.resolve(&AssetRequest::get(font)).await.unwrap();
        assert_eq!(resolution.response.response_type, ResponseType::Cors);
        assert!(resolution.population.is_none());
        assert_eq!(db.asset_count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_error_status_returned_but_not_stored() {
        let transport = FakeTransport::new();
        let target = url("/missing.js");
        let mut not_found = crate::testing::ok_response(&target, "nope");
        not_found.status = 404;
        transport.serve_response(&target, not_found);
        let (manager, db) = manager(transport, "c").await;

        let resolution = manager.resolve(&AssetRequest::get(target)).await.unwrap();
        assert_eq!(resolution.response.status, 404);
        assert!(resolution.population.is_none());
        assert_eq!(db.asset_count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_post_miss_not_stored() {
        let transport = FakeTransport::new();
        transport.serve(&url("/api/echo"), "{}");
        let (manager, _db) = manager(transport, "c").await;

        let request = AssetRequest { method: "POST".into(), ..AssetRequest::get(url("/api/echo")) };
        let resolution = manager.resolve(&request).await.unwrap();
        assert!(resolution.population.is_none());
    }

    #[tokio::test]
    async fn test_navigation_falls_back_to_root_document() {
        let transport = FakeTransport::new();
        transport.serve(&url("/"), "root");
        transport.serve(&url("/index.html"), "<html>shell</html>");
        let (manager, _db) = manager(transport.clone(), "c").await;
        manager.warm(&["/".to_string(), "/index.html".to_string()]).await.unwrap();

        transport.go_offline();
        let resolution = manager.resolve(&AssetRequest::navigation(url("/jobs/42"))).await.unwrap();
        assert_eq!(resolution.source, ResponseSource::Fallback);
        assert_eq!(resolution.response.body.as_ref(), b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_subresource_miss_offline_propagates() {
        let transport = FakeTransport::new();
        transport.serve(&url("/index.html"), "<html>shell</html>");
        let (manager, _db) = manager(transport.clone(), "c").await;
        manager.warm(&["/index.html".to_string()]).await.unwrap();

        transport.go_offline();
        let result = manager.resolve(&AssetRequest::get(url("/logo.png"))).await;
        assert!(matches!(result, Err(Error::NetworkFailure(_))));
    }

    #[tokio::test]
    async fn test_navigation_without_fallback_propagates() {
        let transport = FakeTransport::new();
        let (manager, _db) = manager(transport, "c").await;

        let result = manager.resolve(&AssetRequest::navigation(url("/"))).await;
        assert!(matches!(result, Err(Error::NetworkFailure(_))));
    }

    #[tokio::test]
    async fn test_warm_stores_manifest() {
        let transport = FakeTransport::new();
        transport.serve(&url("/"), "root");
        transport.serve(&url("/shell.js"), "shell()");
        let (manager, db) = manager(transport, "careerboost-v1").await;

        let stored = manager.warm(&["/".to_string(), "/shell.js".to_string()]).await.unwrap();
        assert_eq!(stored, 2);
        assert_eq!(db.asset_count("careerboost-v1").await.unwrap(), 2);
        let key = AssetRequest::get(url("/shell.js")).cache_key();
        assert!(db.match_asset("careerboost-v1", &key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_warm_fails_on_any_entry_and_keeps_earlier_ones() {
        let transport = FakeTransport::new();
        transport.serve(&url("/"), "root");
        transport.fail(&url("/shell.js"));
        let (manager, db) = manager(transport, "careerboost-v1").await;

        let result = manager.warm(&["/".to_string(), "/shell.js".to_string()]).await;
        assert!(matches!(result, Err(Error::CacheWarmFailure { ref url, .. }) if url == "/shell.js"));
        assert_eq!(db.asset_count("careerboost-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_warm_fails_on_error_status() {
        let transport = FakeTransport::new();
        let target = url("/manifest.json");
        let mut gone = crate::testing::ok_response(&target, "");
        gone.status = 410;
        transport.serve_response(&target, gone);
        let (manager, _db) = manager(transport, "c").await;

        let result = manager.warm(&["/manifest.json".to_string()]).await;
        assert!(matches!(result, Err(Error::CacheWarmFailure { reason, .. }) if reason == "status 410"));
    }

    #[tokio::test]
    async fn test_evict_leaves_single_generation() {
        let transport = FakeTransport::new();
        let (manager, db) = manager(transport, "careerboost-v3").await;
        for name in ["careerboost-v1", "careerboost-v2", "careerboost-v3"] {
            db.open_cache(name).await.unwrap();
        }

        let deleted = manager.evict_generations_except("careerboost-v3").await.unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(db.cache_names().await.unwrap(), vec!["careerboost-v3".to_string()]);

        let deleted = manager.evict_generations_except("careerboost-v3").await.unwrap();
        assert!(deleted.is_empty());
        assert_eq!(db.cache_names().await.unwrap(), vec!["careerboost-v3".to_string()]);
    }
}
