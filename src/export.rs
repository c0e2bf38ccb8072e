//! Span export.
//!
//! An [`SpanExporter`] is the external collaborator that ships a batch of
//! finalized [`SpanRecord`]s out of the process. The pipeline guarantees it
//! is never invoked with an empty batch and never concurrently with itself;
//! it must make no assumptions across batches.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::error::{TraceError, TraceResult};
use crate::span::SpanRecord;

/// Results of an export attempt.
pub type ExportResult = Result<(), TraceError>;

/// An interface for shipping batches of finalized spans to a backend.
///
/// The future returned by [`export`](Self::export) is driven on the batch
/// flusher's dedicated thread and raced against the configured export
/// timeout, so implementations should suspend on I/O rather than block.
pub trait SpanExporter: Send + Debug {
    /// Export a non-empty batch of finished spans.
    ///
    /// A failed batch is discarded by the caller; there is no retry.
    fn export(&mut self, batch: Vec<SpanRecord>) -> BoxFuture<'static, ExportResult>;

    /// Shut down the exporter, releasing any held resources.
    fn shutdown(&mut self) {}
}

/// An in-memory span exporter that stores exported batches in a shared
/// vector.
///
/// Useful for testing and debugging. Finished spans can be retrieved with
/// [`get_finished_spans`](InMemorySpanExporter::get_finished_spans); clones
/// share the same storage.
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

/// Builder for [`InMemorySpanExporter`].
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporterBuilder {}

impl InMemorySpanExporterBuilder {
    /// Creates a new instance of the `InMemorySpanExporterBuilder`.
    pub fn new() -> Self {
        Self {}
    }

    /// Creates a new instance of the `InMemorySpanExporter`.
    pub fn build(&self) -> InMemorySpanExporter {
        InMemorySpanExporter {
            spans: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InMemorySpanExporter {
    /// Returns the finished spans exported so far.
    ///
    /// # Errors
    ///
    /// Returns a `TraceError` if the internal lock cannot be acquired.
    pub fn get_finished_spans(&self) -> TraceResult<Vec<SpanRecord>> {
        self.spans
            .lock()
            .map(|spans_guard| spans_guard.clone())
            .map_err(TraceError::from)
    }

    /// Clears the internal storage of finished spans.
    pub fn reset(&self) {
        let _ = self.spans.lock().map(|mut spans_guard| spans_guard.clear());
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, mut batch: Vec<SpanRecord>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .spans
            .lock()
            .map(|mut spans_guard| spans_guard.append(&mut batch))
            .map_err(|err| TraceError::Other(format!("failed to lock spans: {err:?}")));
        Box::pin(std::future::ready(result))
    }

    // Default `shutdown` is kept: storage stays readable so tests can
    // inspect what the final flush delivered.
}
