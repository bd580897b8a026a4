//! Core types and shared functionality for shellsync.
//!
//! This crate provides:
//! - Durable store with SQLite backend (asset cache generations, sync queue)
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod store;

pub use config::{AppConfig, ConfigError, NotificationConfig, ReleaseConfig};
pub use error::Error;
pub use store::{CachedAsset, PendingApplication, ResumeSnapshot, StoreDb};
