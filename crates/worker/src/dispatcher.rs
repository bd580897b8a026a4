//! Maps host events to handlers.
//!
//! Every event runs as its own task and yields a [`Completion`]. The host
//! must await [`Completion::finished`] before tearing the worker down, since
//! work such as storing a freshly fetched asset continues after the response
//! has been handed back.

use std::sync::Arc;

use shellsync_client::{AssetRequest, AssetResponse, FetchClient, FetchConfig, Transport, resolve};
use shellsync_core::{AppConfig, Error, ReleaseConfig, StoreDb};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::events::{Event, WorkerMessage};
use crate::host::ClientHost;
use crate::lifecycle::LifecycleController;
use crate::notify::{JOB_UPDATES_TAG, NotificationRelay};
use crate::sync::{SyncCoordinator, SyncEndpoints, SyncTrack};

type ResponseSlot = oneshot::Sender<Result<AssetResponse, Error>>;

/// Handle to a dispatched event.
#[derive(Debug)]
pub struct Completion {
    response: Option<oneshot::Receiver<Result<AssetResponse, Error>>>,
    task: JoinHandle<Result<(), Error>>,
}

impl Completion {
    /// The fetch response, available before the task finishes. `None` for
    /// events that produce no response, or once taken.
    pub fn take_response(&mut self) -> Option<oneshot::Receiver<Result<AssetResponse, Error>>> {
        self.response.take()
    }

    /// Wait for all work started by the event.
    pub async fn finished(self) -> Result<(), Error> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::HandlerAborted(e.to_string())),
        }
    }
}

pub struct Worker {
    db: StoreDb,
    transport: Arc<dyn Transport>,
    release: ReleaseConfig,
    lifecycle: LifecycleController,
    sync: SyncCoordinator,
    relay: NotificationRelay,
}

impl Worker {
    /// Open the store and HTTP client named by `config`.
    pub async fn from_config(config: &AppConfig, host: Arc<dyn ClientHost>) -> Result<Arc<Self>, Error> {
        let db = StoreDb::open(&config.db_path).await?;
        let transport = Arc::new(FetchClient::new(FetchConfig::from_app(config)?)?);
        Self::new(db, transport, host, config).await
    }

    /// Build a worker and restore the release a previous run activated.
    pub async fn new(
        db: StoreDb, transport: Arc<dyn Transport>, host: Arc<dyn ClientHost>, config: &AppConfig,
    ) -> Result<Arc<Self>, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let job_updates = resolve(&origin, &config.job_updates_endpoint)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.job_updates_endpoint)))?;
        let release = config.release();

        let lifecycle = LifecycleController::new(
            db.clone(),
            transport.clone(),
            host.clone(),
            origin,
            config.skip_waiting_on_install,
        );
        lifecycle.restore().await?;

        let sync = SyncCoordinator::new(db.clone(), transport.clone(), SyncEndpoints::from_config(config)?);
        let relay = NotificationRelay::new(host, transport.clone(), config.notifications.clone(), job_updates);

        Ok(Arc::new(Self { db, transport, release, lifecycle, sync, relay }))
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn store(&self) -> &StoreDb {
        &self.db
    }

    pub fn dispatch(self: &Arc<Self>, event: Event) -> Completion {
        tracing::debug!(kind = event.kind(), "dispatching event");
        let worker = Arc::clone(self);
        let (slot, response) = match event {
            Event::Fetch { .. } => {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            }
            _ => (None, None),
        };
        let task = tokio::spawn(async move { worker.handle(event, slot).await });
        Completion { response, task }
    }

    async fn handle_fetch(&self, request: AssetRequest, slot: Option<ResponseSlot>) -> Result<(), Error> {
        let deliver = |result| {
            if let Some(slot) = slot {
                let _ = slot.send(result);
            }
        };

        let Some(cache) = self.lifecycle.active_cache().await else {
            deliver(self.transport.fetch(&request).await);
            return Ok(());
        };

        match cache.resolve(&request).await {
            Ok(resolution) => {
                deliver(Ok(resolution.response));
                if let Some(population) = resolution.population {
                    population.await.map_err(|e| Error::HandlerAborted(e.to_string()))?;
                }
            }
            Err(e) => deliver(Err(e)),
        }
        Ok(())
    }

    async fn handle(&self, event: Event, slot: Option<ResponseSlot>) -> Result<(), Error> {
        match event {
            Event::Install { release } => {
                self.lifecycle.install(release.unwrap_or_else(|| self.release.clone())).await?;
            }
            Event::Activate => {
                self.lifecycle.activate_waiting().await?;
            }
            Event::Fetch { request } => self.handle_fetch(request, slot).await?,
            Event::Sync { tag } => match SyncTrack::from_tag(&tag) {
                Some(track) => {
                    self.sync.run(track).await?;
                }
                None => tracing::warn!(tag = %tag, "ignoring sync for unknown tag"),
            },
            Event::PeriodicSync { tag } => {
                if tag == JOB_UPDATES_TAG {
                    if let Err(e) = self.relay.check_job_updates().await {
                        tracing::warn!(error = %e, "job update check failed");
                    }
                } else {
                    tracing::debug!(tag = %tag, "ignoring periodic sync for unknown tag");
                }
            }
            Event::Push { payload } => {
                self.relay.on_push(payload.as_deref()).await?;
            }
            Event::NotificationClick { action } => {
                self.relay.on_notification_click(action.as_deref()).await?;
            }
            Event::Message { data } => self.handle_message(&data).await?,
            Event::ConnectivityRestored => {
                let mut first_error = None;
                for (track, result) in self.sync.run_all().await {
                    if let Err(e) = result {
                        tracing::warn!(
                            track = %track,
                            error = %e,
                            retryable = e.is_retryable(),
                            "sync after reconnect failed"
                        );
                        first_error.get_or_insert(e);
                    }
                }
                if let Some(e) = first_error {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn handle_message(&self, data: &serde_json::Value) -> Result<(), Error> {
        let Some(message) = WorkerMessage::from_value(data) else {
            tracing::debug!("ignoring unrecognized message");
            return Ok(());
        };

        match message {
            WorkerMessage::SkipWaiting => {
                self.lifecycle.skip_waiting().await?;
            }
            WorkerMessage::CacheResume { resume_data } => {
                if let Err(e) = self.db.put_resume_snapshot(&resume_data).await {
                    tracing::warn!(error = %e, "failed to store resume snapshot");
                }
            }
            WorkerMessage::QueueApplication { application } => {
                if let Err(e) = self.db.enqueue_application(&application).await {
                    tracing::warn!(error = %e, "failed to queue application");
                }
            }
        }
        Ok(())
    }
}
