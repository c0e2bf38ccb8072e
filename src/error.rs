//! Error types shared across the tracing pipeline.

use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Result type for fallible tracing operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors surfaced by the span export pipeline.
///
/// These are diagnostic only. Per the crate's delivery contract, no error in
/// this enum may ever reach a request handler's caller or change a response.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The exporter did not complete within the configured export timeout.
    #[error("export timed out after {0:?}")]
    ExportTimedOut(Duration),

    /// The exporter reported a failure for a batch. The batch is discarded.
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// Other types of failures not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string())
    }
}

/// Errors returned by shutdown operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ShutdownError {
    /// Shutdown timed out before the queue drained. Undelivered spans are
    /// counted dropped and abandoned.
    #[error("shutdown timed out after {0:?}")]
    Timeout(Duration),

    /// Shutdown was already invoked on this processor.
    #[error("processor already shut down")]
    AlreadyShutdown,

    /// An unexpected error occurred during shutdown.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl<T> From<PoisonError<T>> for ShutdownError {
    fn from(err: PoisonError<T>) -> Self {
        ShutdownError::Other(err.to_string().into())
    }
}
