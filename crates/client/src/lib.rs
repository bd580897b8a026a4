//! Client code for shellsync.
//!
//! This crate provides the HTTP side of the offline-sync worker: URL
//! resolution against the app origin, request/response types, and the
//! [`Transport`] seam with its reqwest implementation.

pub mod fetch;
pub mod request;
pub mod transport;

pub use fetch::{FetchClient, FetchConfig, UrlError, is_same_origin, resolve};
pub use request::{AssetRequest, AssetResponse, Destination, ResponseType};
pub use transport::Transport;
