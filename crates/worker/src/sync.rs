//! Background sync of the durable queue.
//!
//! Each [`SyncTrack`] runs the cycle Idle → Draining → Uploading →
//! Reconciling → Idle. A record leaves the store only after the endpoint
//! returned 2xx for the batch that contained it; anything else leaves the
//! store untouched for the next trigger.
//!
//! Tracks are single-flight. A trigger that finds its track busy is folded
//! into one follow-up cycle that runs once the in-flight cycle succeeds.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use shellsync_client::{Transport, resolve};
use shellsync_core::{AppConfig, Error, StoreDb};
use tokio::sync::watch;
use url::Url;

/// One independently synced queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTrack {
    #[serde(rename = "resume-sync")]
    Resume,
    #[serde(rename = "job-application-sync")]
    Applications,
}

impl SyncTrack {
    pub const ALL: [SyncTrack; 2] = [SyncTrack::Resume, SyncTrack::Applications];

    /// The sync tag the host registers for this track.
    pub fn tag(self) -> &'static str {
        match self {
            SyncTrack::Resume => "resume-sync",
            SyncTrack::Applications => "job-application-sync",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|track| track.tag() == tag)
    }
}

impl fmt::Display for SyncTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Draining,
    Uploading,
    Reconciling,
}

/// Result of a completed trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The queue was empty; no request was made.
    Empty,
    /// The endpoint acknowledged the batch and `cleared` records were removed.
    Synced { cleared: u64 },
    /// Another cycle of the same track was in flight and will re-run.
    Coalesced,
}

impl SyncOutcome {
    fn merge(self, next: SyncOutcome) -> SyncOutcome {
        match (self, next) {
            (SyncOutcome::Synced { cleared: a }, SyncOutcome::Synced { cleared: b }) => {
                SyncOutcome::Synced { cleared: a + b }
            }
            (synced @ SyncOutcome::Synced { .. }, _) => synced,
            (_, next) => next,
        }
    }
}

/// Remote endpoints that accept queued writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEndpoints {
    pub resume: Url,
    pub applications: Url,
}

impl SyncEndpoints {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let endpoint = |path: &str| resolve(&origin, path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")));
        Ok(Self {
            resume: endpoint(&config.resume_sync_endpoint)?,
            applications: endpoint(&config.application_sync_endpoint)?,
        })
    }
}

struct TrackState {
    in_flight: AtomicBool,
    rerun: AtomicBool,
    phase: watch::Sender<SyncPhase>,
}

impl TrackState {
    fn new() -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self { in_flight: AtomicBool::new(false), rerun: AtomicBool::new(false), phase }
    }

    fn try_claim(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }
}

/// Releases a claimed track on every exit path, including cancellation.
struct Flight<'a> {
    state: &'a TrackState,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.state.set_phase(SyncPhase::Idle);
        self.state.in_flight.store(false, Ordering::Release);
    }
}

/// Drains the durable queue to the remote endpoints.
pub struct SyncCoordinator {
    db: StoreDb,
    transport: Arc<dyn Transport>,
    endpoints: SyncEndpoints,
    resume: TrackState,
    applications: TrackState,
}

impl SyncCoordinator {
    pub fn new(db: StoreDb, transport: Arc<dyn Transport>, endpoints: SyncEndpoints) -> Self {
        Self { db, transport, endpoints, resume: TrackState::new(), applications: TrackState::new() }
    }

    fn track(&self, track: SyncTrack) -> &TrackState {
        match track {
            SyncTrack::Resume => &self.resume,
            SyncTrack::Applications => &self.applications,
        }
    }

    /// Current phase of a track.
    pub fn phase(&self, track: SyncTrack) -> SyncPhase {
        *self.track(track).phase.borrow()
    }

    /// Watch a track's phase transitions.
    pub fn subscribe(&self, track: SyncTrack) -> watch::Receiver<SyncPhase> {
        self.track(track).phase.subscribe()
    }

    /// Run one trigger for `track`.
    ///
    /// Returns `Coalesced` without touching the store if the track is busy.
    pub async fn run(&self, track: SyncTrack) -> Result<SyncOutcome, Error> {
        let state = self.track(track);
        if !state.try_claim() {
            state.rerun.store(true, Ordering::Release);
            tracing::debug!(track = %track, "sync already in flight, coalescing trigger");
            return Ok(SyncOutcome::Coalesced);
        }

        let mut outcome = SyncOutcome::Empty;
        loop {
            let cycle = {
                let _flight = Flight { state };
                state.rerun.store(false, Ordering::Release);
                self.cycle(track, state).await
            };

            match cycle {
                Ok(result) => outcome = outcome.merge(result),
                Err(e) => {
                    state.rerun.store(false, Ordering::Release);
                    if e.is_retryable() {
                        tracing::warn!(track = %track, error = %e, "sync failed, queue left for next trigger");
                    } else {
                        tracing::error!(track = %track, error = %e, "sync failed and will not succeed on retry");
                    }
                    return Err(e);
                }
            }

            if !state.rerun.swap(false, Ordering::AcqRel) || !state.try_claim() {
                return Ok(outcome);
            }
            tracing::debug!(track = %track, "running coalesced sync trigger");
        }
    }

    /// Run both tracks concurrently, as on connectivity restoration.
    pub async fn run_all(&self) -> [(SyncTrack, Result<SyncOutcome, Error>); 2] {
        let (resume, applications) = tokio::join!(self.run(SyncTrack::Resume), self.run(SyncTrack::Applications));
        [(SyncTrack::Resume, resume), (SyncTrack::Applications, applications)]
    }

    async fn cycle(&self, track: SyncTrack, state: &TrackState) -> Result<SyncOutcome, Error> {
        match track {
            SyncTrack::Resume => self.sync_resume(state).await,
            SyncTrack::Applications => self.sync_applications(state).await,
        }
    }

    async fn sync_resume(&self, state: &TrackState) -> Result<SyncOutcome, Error> {
        state.set_phase(SyncPhase::Draining);
        let Some(snapshot) = self.db.get_resume_snapshot().await? else {
            return Ok(SyncOutcome::Empty);
        };

        state.set_phase(SyncPhase::Uploading);
        self.upload(&self.endpoints.resume, &snapshot.payload).await?;

        state.set_phase(SyncPhase::Reconciling);
        let cleared = self.db.clear_resume_snapshot_revision(snapshot.revision).await?;
        if cleared {
            tracing::info!("resume data synced successfully");
        } else {
            tracing::info!("resume data synced; a newer snapshot stays queued");
        }
        Ok(SyncOutcome::Synced { cleared: u64::from(cleared) })
    }

    async fn sync_applications(&self, state: &TrackState) -> Result<SyncOutcome, Error> {
        state.set_phase(SyncPhase::Draining);
        let drained = self.db.list_applications().await?;
        let Some(max_id) = drained.last().map(|application| application.id) else {
            return Ok(SyncOutcome::Empty);
        };

        state.set_phase(SyncPhase::Uploading);
        let batch = serde_json::Value::Array(drained.into_iter().map(|application| application.payload).collect());
        self.upload(&self.endpoints.applications, &batch).await?;

        state.set_phase(SyncPhase::Reconciling);
        let cleared = self.db.clear_applications_through(max_id).await?;
        tracing::info!(cleared, "job applications synced successfully");
        Ok(SyncOutcome::Synced { cleared })
    }

    async fn upload(&self, endpoint: &Url, body: &serde_json::Value) -> Result<(), Error> {
        let status = self.transport.post_json(endpoint, body).await?;
        if !(200..300).contains(&status) {
            return Err(Error::RemoteRejection { endpoint: endpoint.path().to_string(), status });
        }
        Ok(())
    }
}
