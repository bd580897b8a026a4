//! Unified error types for shellsync.
//!
//! Every failure in the offline-sync core is recovered locally by retrying on
//! the next trigger, so these values are logged rather than shown to users.

use tokio_rusqlite::rusqlite;

/// Unified error types for the offline-sync worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The durable store could not be read or written.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_UNAVAILABLE: migration failed: {0}")]
    MigrationFailed(String),

    /// A fetch or POST could not complete.
    #[error("NETWORK_FAILURE: {0}")]
    NetworkFailure(String),

    /// The remote endpoint answered with a non-success status.
    #[error("REMOTE_REJECTION: {endpoint} returned {status}")]
    RemoteRejection { endpoint: String, status: u16 },

    /// An asset in the install manifest could not be fetched.
    #[error("CACHE_WARM_FAILURE: {url}: {reason}")]
    CacheWarmFailure { url: String, reason: String },

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// A stored or received payload could not be (de)serialized.
    #[error("INVALID_PAYLOAD: {0}")]
    InvalidPayload(String),

    /// An event handler task panicked or was cancelled before completing.
    #[error("HANDLER_ABORTED: {0}")]
    HandlerAborted(String),
}

impl Error {
    /// Whether the failure leaves queued data in place for the next trigger.
    ///
    /// Network failures and remote rejections are retried identically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NetworkFailure(_) | Error::RemoteRejection { .. } | Error::StorageUnavailable(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => {
                Error::StorageUnavailable(tokio_rusqlite::Error::ConnectionClosed)
            }
            tokio_rusqlite::Error::Close(c) => Error::StorageUnavailable(tokio_rusqlite::Error::Close(c)),
            _ => Error::StorageUnavailable(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::StorageUnavailable(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StorageUnavailable(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::RemoteRejection { endpoint: "/api/sync-resume".to_string(), status: 503 };
        assert!(err.to_string().contains("REMOTE_REJECTION"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_warm_failure_display() {
        let err = Error::CacheWarmFailure { url: "/shell.js".to_string(), reason: "status 404".to_string() };
        assert_eq!(err.to_string(), "CACHE_WARM_FAILURE: /shell.js: status 404");
    }

    #[test]
    fn test_retryable() {
        assert!(Error::NetworkFailure("offline".into()).is_retryable());
        assert!(Error::RemoteRejection { endpoint: "/x".into(), status: 500 }.is_retryable());
        assert!(!Error::InvalidUrl("::".into()).is_retryable());
    }

    #[test]
    fn test_serde_error_maps_to_invalid_payload() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }
}
