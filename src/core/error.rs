use std::io;

use thiserror::Error;

/// Failure kinds surfaced by every store operation.
///
/// Provider adapters translate their native failures into these kinds, so callers never
/// depend on a backend-specific error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller-supplied path is absolute or malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The path normalizes to a location outside the sandbox root.
    #[error("path escapes the store root: {0}")]
    PathEscapesRoot(String),

    #[error("{0} does not exist")]
    NotFound(String),

    /// A copy reached a non-success terminal status, or the target kind is unsupported.
    #[error("transfer from {source_path} to {target} failed: {reason}")]
    TransferFailed {
        source_path: String,
        target: String,
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// The operation is not valid for this kind of storage.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A backend failure that fits none of the kinds above.
    #[error("storage provider error: {0}")]
    Provider(#[source] anyhow::Error),
}

impl StoreError {
    /// Returns `false` for outcomes that will not change when the same call is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::TransferFailed { .. } | StoreError::Provider(_)
        )
    }

    /// `true` if the error is one of the sandboxing failures.
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidPath(_) | StoreError::PathEscapesRoot(_)
        )
    }

    pub(crate) fn transfer_failed(source: &str, target: &str, reason: impl Into<String>) -> Self {
        StoreError::TransferFailed {
            source_path: source.to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Translates an I/O failure observed while working on `path`.
    pub(crate) fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            _ => StoreError::from(err),
        }
    }
}

/// Marker carried inside an [`io::Error`] when a stream read observes cancellation.
#[derive(Debug, Error)]
#[error("operation cancelled")]
pub(crate) struct CancelledIo;

pub(crate) fn cancelled_io() -> io::Error {
    io::Error::new(io::ErrorKind::Other, CancelledIo)
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        if err
            .get_ref()
            .is_some_and(|inner| inner.downcast_ref::<CancelledIo>().is_some())
        {
            return StoreError::Cancelled;
        }
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(err.to_string()),
            io::ErrorKind::Unsupported => StoreError::Unsupported(err.to_string()),
            _ => StoreError::Provider(anyhow::Error::new(err)),
        }
    }
}
