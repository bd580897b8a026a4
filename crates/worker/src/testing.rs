//! In-memory doubles shared by the worker's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use shellsync_client::{AssetRequest, AssetResponse, ResponseType, Transport};
use shellsync_core::{AppConfig, Error, ReleaseConfig, StoreDb};
use tokio::sync::oneshot;
use url::Url;

use crate::host::{ClientHost, Notification};

pub const ORIGIN: &str = "https://careers.example";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

pub fn test_config() -> AppConfig {
    AppConfig { origin: ORIGIN.into(), manifest: vec!["/".into(), "/index.html".into()], ..Default::default() }
}

pub fn release(cache_name: &str, manifest: &[&str]) -> ReleaseConfig {
    ReleaseConfig {
        cache_name: cache_name.into(),
        manifest: manifest.iter().map(|s| s.to_string()).collect(),
        fallback_document: "/index.html".into(),
    }
}

pub async fn memory_db() -> StoreDb {
    StoreDb::open_in_memory().await.unwrap()
}

pub fn ok_response(url: &Url, body: &'static str) -> AssetResponse {
    let response_type =
        if url.origin() == origin().origin() { ResponseType::Basic } else { ResponseType::Cors };
    AssetResponse {
        url: url.to_string(),
        status: 200,
        headers: vec![("content-type".into(), "text/plain".into())],
        body: Bytes::from_static(body.as_bytes()),
        response_type,
    }
}

/// Holds a POST until the test releases it.
pub struct PostGate {
    arrived: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl PostGate {
    /// Returns the gate plus handles: wait for arrival, then release.
    pub fn new() -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (arrived_tx, arrived_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        (Self { arrived: arrived_tx, release: release_rx }, arrived_rx, release_tx)
    }
}

/// Scriptable network: canned responses by URL, queued POST statuses.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, Result<AssetResponse, String>>>,
    post_statuses: Mutex<VecDeque<Result<u16, String>>>,
    post_gate: Mutex<Option<PostGate>>,
    job_updates: Mutex<Option<Result<serde_json::Value, String>>>,
    pub fetches: Mutex<Vec<String>>,
    pub posts: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &Url, body: &'static str) {
        self.responses.lock().unwrap().insert(url.to_string(), Ok(ok_response(url, body)));
    }

    pub fn serve_response(&self, url: &Url, response: AssetResponse) {
        self.responses.lock().unwrap().insert(url.to_string(), Ok(response));
    }

    pub fn fail(&self, url: &Url) {
        self.responses.lock().unwrap().insert(url.to_string(), Err("connection refused".into()));
    }

    /// Every unscripted URL fails like an offline network.
    pub fn go_offline(&self) {
        self.responses.lock().unwrap().clear();
    }

    pub fn push_post_status(&self, status: u16) {
        self.post_statuses.lock().unwrap().push_back(Ok(status));
    }

    pub fn push_post_failure(&self) {
        self.post_statuses.lock().unwrap().push_back(Err("network unreachable".into()));
    }

    pub fn gate_next_post(&self, gate: PostGate) {
        *self.post_gate.lock().unwrap() = Some(gate);
    }

    pub fn set_job_updates(&self, jobs: serde_json::Value) {
        *self.job_updates.lock().unwrap() = Some(Ok(jobs));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, Error> {
        self.fetches.lock().unwrap().push(request.url.to_string());
        let scripted = self.responses.lock().unwrap().get(request.url.as_str()).cloned();
        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(Error::NetworkFailure(reason)),
            None => Err(Error::NetworkFailure(format!("offline: {}", request.url))),
        }
    }

    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> Result<u16, Error> {
        self.posts.lock().unwrap().push((url.path().to_string(), body.clone()));
        let gate = self.post_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.arrived.send(());
            let _ = gate.release.await;
        }
        let scripted = self.post_statuses.lock().unwrap().pop_front();
        match scripted.unwrap_or(Ok(200)) {
            Ok(status) => Ok(status),
            Err(reason) => Err(Error::NetworkFailure(reason)),
        }
    }

    async fn get_json(&self, url: &Url) -> Result<serde_json::Value, Error> {
        self.fetches.lock().unwrap().push(url.to_string());
        match self.job_updates.lock().unwrap().clone() {
            Some(Ok(value)) => Ok(value),
            Some(Err(reason)) => Err(Error::NetworkFailure(reason)),
            None => Err(Error::NetworkFailure("offline".into())),
        }
    }
}

/// Records every command sent to the page.
#[derive(Default)]
pub struct RecordingHost {
    pub notifications: Mutex<Vec<Notification>>,
    pub opened: Mutex<Vec<String>>,
    pub claims: Mutex<usize>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ClientHost for RecordingHost {
    async fn show_notification(&self, notification: Notification) -> Result<(), Error> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<(), Error> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), Error> {
        *self.claims.lock().unwrap() += 1;
        Ok(())
    }
}
