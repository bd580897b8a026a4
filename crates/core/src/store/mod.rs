//! SQLite-backed durable store for the offline-sync worker.
//!
//! This module provides persistent storage using SQLite with async access via
//! tokio-rusqlite. It holds:
//!
//! - Versioned asset cache generations keyed by request hash
//! - The singleton pending résumé snapshot
//! - The ordered queue of pending job applications
//! - The record of the last activated release
//!
//! Every operation runs as a single statement or transaction on the
//! connection's background thread, so readers never observe partial writes.

pub mod applications;
pub mod assets;
pub mod connection;
pub mod hash;
pub mod migrations;
pub mod registration;
pub mod resumes;

pub use crate::Error;

pub use applications::PendingApplication;
pub use assets::CachedAsset;
pub use connection::StoreDb;
pub use resumes::{RESUME_SNAPSHOT_ID, ResumeSnapshot};
