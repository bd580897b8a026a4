//! Install and activation of asset releases.
//!
//! Instances move forward through Installing → Waiting → Activating →
//! Active and end as Redundant when their install fails or a newer instance
//! takes over. Fetch events are served by whichever instance is Active.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use shellsync_client::Transport;
use shellsync_core::{Error, ReleaseConfig, StoreDb};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::cache_manager::CacheManager;
use crate::host::ClientHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

impl InstanceState {
    /// Transitions only move forward; Redundant is terminal.
    pub fn can_advance_to(self, next: InstanceState) -> bool {
        next > self
    }
}

/// How a successful install ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The new release took over immediately.
    Activated,
    /// The new release is installed and waits for a takeover signal.
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub id: u64,
    pub cache_name: String,
    pub state: InstanceState,
}

/// Snapshot of the registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationStatus {
    pub active: Option<InstanceInfo>,
    pub waiting: Option<InstanceInfo>,
    pub installing: Option<InstanceInfo>,
    /// A newer instance is installing or waiting next to an active one.
    pub updating: bool,
}

struct Instance {
    id: u64,
    state: InstanceState,
    cache: Arc<CacheManager>,
}

impl Instance {
    fn advance(&mut self, next: InstanceState) {
        if self.state.can_advance_to(next) {
            tracing::debug!(instance = self.id, from = ?self.state, to = ?next, "instance state changed");
            self.state = next;
        } else {
            tracing::warn!(instance = self.id, from = ?self.state, to = ?next, "ignored backward transition");
        }
    }

    fn info(&self) -> InstanceInfo {
        InstanceInfo { id: self.id, cache_name: self.cache.cache_name().to_string(), state: self.state }
    }
}

#[derive(Default)]
struct Registration {
    installing: Option<Instance>,
    waiting: Option<Instance>,
    active: Option<Instance>,
}

pub struct LifecycleController {
    db: StoreDb,
    transport: Arc<dyn Transport>,
    host: Arc<dyn ClientHost>,
    origin: Url,
    skip_waiting_on_install: bool,
    registration: RwLock<Registration>,
    /// Serializes install and activation.
    transition: Mutex<()>,
    skip_requested: AtomicBool,
    next_id: AtomicU64,
}

impl LifecycleController {
    pub fn new(
        db: StoreDb, transport: Arc<dyn Transport>, host: Arc<dyn ClientHost>, origin: Url,
        skip_waiting_on_install: bool,
    ) -> Self {
        Self {
            db,
            transport,
            host,
            origin,
            skip_waiting_on_install,
            registration: RwLock::new(Registration::default()),
            transition: Mutex::new(()),
            skip_requested: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    fn instance(&self, release: ReleaseConfig, state: InstanceState) -> Instance {
        let cache = CacheManager::new(self.db.clone(), self.transport.clone(), release, self.origin.clone());
        Instance { id: self.next_id.fetch_add(1, Ordering::Relaxed), state, cache: Arc::new(cache) }
    }

    /// Cache manager of the active instance, if any.
    pub async fn active_cache(&self) -> Option<Arc<CacheManager>> {
        self.registration.read().await.active.as_ref().map(|instance| instance.cache.clone())
    }

    pub async fn status(&self) -> RegistrationStatus {
        let registration = self.registration.read().await;
        let active = registration.active.as_ref().map(Instance::info);
        let waiting = registration.waiting.as_ref().map(Instance::info);
        let installing = registration.installing.as_ref().map(Instance::info);
        let updating = active.is_some() && (waiting.is_some() || installing.is_some());
        RegistrationStatus { active, waiting, installing, updating }
    }

    /// Restore the last activated release without warming it again.
    ///
    /// Used at startup so a restarted worker keeps serving what it activated
    /// before. A release whose install failed was never recorded, so it is
    /// never restored. Returns whether an instance was restored.
    pub async fn restore(&self) -> Result<bool, Error> {
        let _transition = self.transition.lock().await;
        if self.registration.read().await.active.is_some() {
            return Ok(false);
        }
        let Some(release) = self.db.active_release().await? else {
            return Ok(false);
        };

        tracing::info!(cache = %release.cache_name, "restored active release");
        let instance = self.instance(release, InstanceState::Active);
        self.registration.write().await.active = Some(instance);
        Ok(true)
    }

    /// Install `release`: warm its generation, then wait or take over.
    ///
    /// On failure the new instance becomes redundant and any active instance
    /// keeps serving.
    pub async fn install(&self, release: ReleaseConfig) -> Result<InstallOutcome, Error> {
        let _transition = self.transition.lock().await;

        let instance = self.instance(release, InstanceState::Installing);
        let cache = instance.cache.clone();
        let id = instance.id;
        self.registration.write().await.installing = Some(instance);
        tracing::info!(instance = id, cache = %cache.cache_name(), "installing release");

        let warmed = cache.warm(&cache.release().manifest).await;

        let mut registration = self.registration.write().await;
        let Some(mut instance) = registration.installing.take() else {
            return Err(Error::HandlerAborted(format!("install of instance {id} lost its registration slot")));
        };
        if let Err(e) = warmed {
            instance.advance(InstanceState::Redundant);
            tracing::error!(instance = id, error = %e, "install failed");
            return Err(e);
        }

        instance.advance(InstanceState::Waiting);
        if let Some(mut replaced) = registration.waiting.replace(instance) {
            replaced.advance(InstanceState::Redundant);
            tracing::info!(instance = replaced.id, "waiting instance replaced by a newer install");
        }

        let skip = self.skip_waiting_on_install
            || self.skip_requested.swap(false, Ordering::AcqRel)
            || registration.active.is_none();
        drop(registration);

        if skip {
            self.activate_locked().await?;
            Ok(InstallOutcome::Activated)
        } else {
            tracing::info!(instance = id, "installed, waiting for takeover");
            Ok(InstallOutcome::Waiting)
        }
    }

    /// Take over with the waiting instance, if there is one.
    ///
    /// A request that arrives during an install is honored by that install.
    pub async fn skip_waiting(&self) -> Result<bool, Error> {
        self.skip_requested.store(true, Ordering::Release);
        let _transition = self.transition.lock().await;
        if !self.skip_requested.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        self.activate_locked().await
    }

    /// Activate the waiting instance. Returns false if nothing is waiting.
    pub async fn activate_waiting(&self) -> Result<bool, Error> {
        let _transition = self.transition.lock().await;
        self.activate_locked().await
    }

    async fn activate_locked(&self) -> Result<bool, Error> {
        let cache = {
            let mut registration = self.registration.write().await;
            let Some(instance) = registration.waiting.as_mut() else {
                return Ok(false);
            };
            instance.advance(InstanceState::Activating);
            instance.cache.clone()
        };

        if let Err(e) = cache.evict_generations_except(cache.cache_name()).await {
            tracing::warn!(error = %e, "failed to evict old caches");
        }
        if let Err(e) = self.host.claim_clients().await {
            tracing::warn!(error = %e, "failed to claim clients");
        }
        if let Err(e) = self.db.set_active_release(cache.release()).await {
            tracing::warn!(error = %e, "failed to record active release");
        }

        let mut registration = self.registration.write().await;
        let Some(mut instance) = registration.waiting.take() else {
            return Ok(false);
        };
        instance.advance(InstanceState::Active);
        tracing::info!(instance = instance.id, cache = %cache.cache_name(), "release activated");
        if let Some(mut previous) = registration.active.replace(instance) {
            previous.advance(InstanceState::Redundant);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, RecordingHost, memory_db, origin, release, url};
    use shellsync_client::AssetRequest;

    fn controller(
        db: &StoreDb, transport: Arc<FakeTransport>, host: Arc<RecordingHost>, skip_waiting_on_install: bool,
    ) -> LifecycleController {
        LifecycleController::new(db.clone(), transport, host, origin(), skip_waiting_on_install)
    }

    fn serve_shell(transport: &FakeTransport) {
        transport.serve(&url("/"), "<html>root</html>");
        transport.serve(&url("/index.html"), "<html>index</html>");
        transport.serve(&url("/shell.js"), "boot()");
    }

    #[test]
    fn test_states_only_move_forward() {
        assert!(InstanceState::Installing.can_advance_to(InstanceState::Waiting));
        assert!(InstanceState::Waiting.can_advance_to(InstanceState::Redundant));
        assert!(!InstanceState::Active.can_advance_to(InstanceState::Installing));
        assert!(!InstanceState::Redundant.can_advance_to(InstanceState::Active));
    }

    #[tokio::test]
    async fn test_first_install_activates() {
        let db = memory_db().await;
        let transport = FakeTransport::new();
        serve_shell(&transport);
        let host = RecordingHost::new();
        let lifecycle = controller(&db, transport, host.clone(), false);

        let outcome = lifecycle.install(release("shell-v1", &["/", "/shell.js"])).await.unwrap();
        assert_eq!(outcome, InstallOutcome::Activated);
        assert_eq!(db.asset_count("shell-v1").await.unwrap(), 2);
        assert_eq!(*host.claims.lock().unwrap(), 1);

        let status = lifecycle.status().await;
        let active = status.active.unwrap();
        assert_eq!(active.cache_name, "shell-v1");
        assert_eq!(active.state, InstanceState::Active);
        assert!(!status.updating);
    }

    #[tokio::test]
    async fn test_failed_first_install_leaves_nothing_active() {
        let db = memory_db().await;
        let transport = FakeTransport::new();
        transport.serve(&url("/"), "<html>root</html>");
        transport.fail(&url("/shell.js"));
        let lifecycle = controller(&db, transport, RecordingHost::new(), true);

        let result = lifecycle.install(release("shell-v1", &["/", "/shell.js"])).await;
        assert!(matches!(result, Err(Error::CacheWarmFailure { url, .. }) if url == "/shell.js"));
        assert!(lifecycle.active_cache().await.is_none());
        assert_eq!(lifecycle.status().await, RegistrationStatus {
            active: None,
            waiting: None,
            installing: None,
            updating: false
        });
    }

    #[tokio::test]
    async fn test_failed_update_keeps_prior_release_serving() {
        let db = memory_db().await;
        let transport = FakeTransport::new();
        serve_shell(&transport);
        let lifecycle = controller(&db, transport.clone(), RecordingHost::new(), true);
        lifecycle.install(release("shell-v1", &["/", "/shell.js"])).await.unwrap();

        transport.fail(&url("/shell.js"));
        assert!(lifecycle.install(release("shell-v2", &["/", "/shell.js"])).await.is_err());

        let active = lifecycle.active_cache().await.unwrap();
        assert_eq!(active.cache_name(), "shell-v1");
        transport.go_offline();
        let resolution = active.resolve(&AssetRequest::get(url("/shell.js"))).await.unwrap();
        assert_eq!(&resolution.response.body[..], b"boot()");
    }

    #[tokio::test]
    async fn test_update_waits_until_skip_waiting() {
        let db = memory_db().await;
        let transport = FakeTransport::new();
        serve_shell(&transport);
        let host = RecordingHost::new();
        let lifecycle = controller(&db, transport, host.clone(), false);
        lifecycle.install(release("shell-v1", &["/"])).await.unwrap();

        let outcome = lifecycle.install(release("shell-v2", &["/", "/shell.js"])).await.unwrap();
        assert_eq!(outcome, InstallOutcome::Waiting);
        let status = lifecycle.status().await;
        assert!(status.updating);
        assert_eq!(status.waiting.unwrap().cache_name, "shell-v2");
        assert_eq!(lifecycle.active_cache().await.unwrap().cache_name(), "shell-v1");

        assert!(lifecycle.skip_waiting().await.unwrap());
        assert_eq!(lifecycle.active_cache().await.unwrap().cache_name(), "shell-v2");
        assert_eq!(db.cache_names().await.unwrap(), vec!["shell-v2".to_string()]);
        assert_eq!(*host.claims.lock().unwrap(), 2);
        assert!(!lifecycle.status().await.updating);
    }

    #[tokio::test]
    async fn test_skip_waiting_with_nothing_waiting_is_noop() {
        let db = memory_db().await;
        let lifecycle = controller(&db, FakeTransport::new(), RecordingHost::new(), false);

        assert!(!lifecycle.skip_waiting().await.unwrap());
        assert!(!lifecycle.activate_waiting().await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_last_activated_release() {
        let db = memory_db().await;
        let transport = FakeTransport::new();
        serve_shell(&transport);
        let first = controller(&db, transport.clone(), RecordingHost::new(), true);
        first.install(release("shell-v1", &["/", "/shell.js"])).await.unwrap();

        let restarted = controller(&db, transport, RecordingHost::new(), true);
        assert!(restarted.restore().await.unwrap());
        let active = restarted.active_cache().await.unwrap();
        assert_eq!(active.cache_name(), "shell-v1");
        assert_eq!(active.release().manifest, vec!["/", "/shell.js"]);
        assert!(!restarted.restore().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_install_is_not_restored() {
        let db = memory_db().await;
        let transport = FakeTransport::new();
        transport.serve(&url("/"), "<html>root</html>");
        transport.fail(&url("/shell.js"));
        let first = controller(&db, transport.clone(), RecordingHost::new(), true);
        assert!(first.install(release("shell-v1", &["/", "/shell.js"])).await.is_err());
        assert_eq!(db.cache_names().await.unwrap(), vec!["shell-v1".to_string()]);

        let restarted = controller(&db, transport, RecordingHost::new(), true);
        assert!(!restarted.restore().await.unwrap());
        assert!(restarted.active_cache().await.is_none());
    }

    #[tokio::test]
    async fn test_prior_release_restored_after_failed_update() {
        let db = memory_db().await;
        let transport = FakeTransport::new();
        serve_shell(&transport);
        let first = controller(&db, transport.clone(), RecordingHost::new(), true);
        first.install(release("shell-v1", &["/", "/shell.js"])).await.unwrap();
        transport.fail(&url("/shell.js"));
        assert!(first.install(release("shell-v2", &["/", "/shell.js"])).await.is_err());

        let restarted = controller(&db, transport, RecordingHost::new(), true);
        assert!(restarted.restore().await.unwrap());
        assert_eq!(restarted.active_cache().await.unwrap().cache_name(), "shell-v1");
    }
}
