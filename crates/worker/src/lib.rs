//! The offline-sync worker.
//!
//! Event-driven core of shellsync: a cache-first interception layer over
//! versioned asset caches, a background-sync coordinator that drains the
//! durable queue, the install/activate lifecycle, and the notification relay.
//! A host delivers events through [`Worker::dispatch`] and awaits the returned
//! [`Completion`] before tearing the worker down.

pub mod cache_manager;
pub mod dispatcher;
pub mod events;
pub mod host;
pub mod lifecycle;
pub mod notify;
pub mod stdio;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use cache_manager::{CacheManager, Resolution, ResponseSource};
pub use dispatcher::{Completion, Worker};
pub use events::{Event, WorkerMessage};
pub use host::{ClientHost, Notification, NotificationAction};
pub use lifecycle::{InstallOutcome, InstanceInfo, InstanceState, LifecycleController, RegistrationStatus};
pub use notify::{ClickRoute, NotificationRelay};
pub use sync::{SyncCoordinator, SyncEndpoints, SyncOutcome, SyncPhase, SyncTrack};
