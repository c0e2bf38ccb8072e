//! Bounded span buffering and batch export.
//!
//! Request threads hand finalized spans to a [`SpanQueue`], which never
//! blocks: when the buffer is full, spans are dropped per the configured
//! [`DropPolicy`] and counted. A [`BatchSpanProcessor`] owns a dedicated
//! background thread that drains the queue in FIFO batches, on a fixed
//! schedule or immediately once a full batch is waiting, and drives the
//! exporter with a bounded per-batch timeout. Failed or timed-out batches
//! are discarded and counted; the next batch proceeds independently. Request
//! latency is structurally decoupled from export latency: the exporter runs
//! only on the flusher thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use futures_executor::block_on;
use futures_timer::Delay;
use futures_util::future::{self, Either};

use crate::config::{Config, DropPolicy};
use crate::error::{ShutdownError, TraceError, TraceResult};
use crate::export::SpanExporter;
use crate::span::SpanRecord;
use crate::{tk_debug, tk_warn};

/// Messages from the enqueue path and the control API to the flusher thread.
#[derive(Debug)]
enum BatchMessage {
    /// The queue has at least one full batch waiting.
    BatchReady,
    ForceFlush(SyncSender<TraceResult<()>>),
    Shutdown(SyncSender<TraceResult<()>>),
}

/// Monotonic counters tracking the health of the export pipeline.
#[derive(Debug, Default)]
pub struct TelemetryCounters {
    dropped_spans: AtomicU64,
    export_failures: AtomicU64,
    exported_spans: AtomicU64,
}

impl TelemetryCounters {
    /// Record `count` dropped spans, returning the previous total.
    fn add_dropped(&self, count: u64) -> u64 {
        self.dropped_spans.fetch_add(count, Ordering::Relaxed)
    }

    fn add_export_failure(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn add_exported(&self, count: u64) {
        self.exported_spans.fetch_add(count, Ordering::Relaxed);
    }

    /// Read a consistent-enough snapshot of the counters.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            dropped_spans: self.dropped_spans.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
            exported_spans: self.exported_spans.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`TelemetryCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    /// Spans discarded by the full-queue policy, export failures, or
    /// shutdown abandonment.
    pub dropped_spans: u64,
    /// Batches that failed or timed out during export.
    pub export_failures: u64,
    /// Spans successfully handed to the exporter.
    pub exported_spans: u64,
}

/// Bounded FIFO buffer of finalized spans, shared between request threads
/// and the flusher thread.
///
/// `enqueue` is the only operation on the request path and never blocks
/// beyond a brief mutex hold; overload is resolved by dropping, not by
/// slowing the service.
#[derive(Debug)]
pub struct SpanQueue {
    spans: Mutex<VecDeque<SpanRecord>>,
    capacity: usize,
    batch_threshold: usize,
    policy: DropPolicy,
    counters: Arc<TelemetryCounters>,
    wakeup: SyncSender<BatchMessage>,
}

impl SpanQueue {
    fn new(
        config: &Config,
        counters: Arc<TelemetryCounters>,
        wakeup: SyncSender<BatchMessage>,
    ) -> Self {
        SpanQueue {
            spans: Mutex::new(VecDeque::with_capacity(config.max_queue_size())),
            capacity: config.max_queue_size(),
            batch_threshold: config.max_export_batch_size(),
            policy: config.drop_policy(),
            counters,
            wakeup,
        }
    }

    /// Buffer a finalized span for export.
    ///
    /// When the queue is at capacity the configured [`DropPolicy`] decides
    /// which span is discarded; the dropped-span counter increments either
    /// way and the caller is never delayed or failed.
    pub fn enqueue(&self, span: SpanRecord) {
        let batch_ready = {
            let mut spans = self.spans.lock().unwrap_or_else(|poison| poison.into_inner());
            if spans.len() >= self.capacity {
                match self.policy {
                    DropPolicy::DropNewest => {
                        drop(spans);
                        if self.counters.add_dropped(1) == 0 {
                            tk_warn!(
                                name: "span_queue.drop_started",
                                policy = self.policy.to_string()
                            );
                        }
                        return;
                    }
                    DropPolicy::DropOldest => {
                        spans.pop_front();
                        spans.push_back(span);
                        if self.counters.add_dropped(1) == 0 {
                            tk_warn!(
                                name: "span_queue.drop_started",
                                policy = self.policy.to_string()
                            );
                        }
                        spans.len() >= self.batch_threshold
                    }
                }
            } else {
                spans.push_back(span);
                spans.len() >= self.batch_threshold
            }
        };

        if batch_ready {
            // Wake the flusher; a full wakeup channel already implies a
            // pending wakeup, so failure is fine to ignore.
            let _ = self.wakeup.try_send(BatchMessage::BatchReady);
        }
    }

    /// Remove and return up to `max` spans in FIFO order.
    pub(crate) fn drain(&self, max: usize) -> Vec<SpanRecord> {
        let mut spans = self.spans.lock().unwrap_or_else(|poison| poison.into_inner());
        let count = max.min(spans.len());
        spans.drain(..count).collect()
    }

    /// The number of spans currently buffered. Never exceeds the configured
    /// maximum queue size.
    pub fn len(&self) -> usize {
        self.spans
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    /// Returns `true` if no spans are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A queue with no flusher behind it, for exercising enqueue semantics in
/// isolation.
#[cfg(test)]
pub(crate) fn detached_queue(config: &Config) -> Arc<SpanQueue> {
    let (wakeup, _receiver) = sync_channel(16);
    Arc::new(SpanQueue::new(
        config,
        Arc::new(TelemetryCounters::default()),
        wakeup,
    ))
}

/// A batch flusher with a dedicated background thread.
///
/// Draining happens on the earlier of the scheduled delay and the queue
/// reaching one full batch. At most one export is in flight at a time; an
/// exporter that wants bounded concurrency can fan out internally, since the
/// pipeline only requires that batches are handed over one at a time.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    queue: Arc<SpanQueue>,
    counters: Arc<TelemetryCounters>,
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    is_shutdown: AtomicBool,
}

impl BatchSpanProcessor {
    /// Spawn the flusher thread for `exporter` under the given configuration.
    pub fn new<E>(exporter: E, config: &Config) -> Self
    where
        E: SpanExporter + 'static,
    {
        let counters = Arc::new(TelemetryCounters::default());
        let (message_sender, message_receiver) = sync_channel(config.max_queue_size());
        let queue = Arc::new(SpanQueue::new(config, counters.clone(), message_sender.clone()));

        let worker = Worker {
            exporter,
            queue: queue.clone(),
            counters: counters.clone(),
            scheduled_delay: config.scheduled_delay(),
            max_export_batch_size: config.max_export_batch_size(),
            export_timeout: config.export_timeout(),
        };
        let handle = thread::Builder::new()
            .name("tracekit-batch-flusher".to_string())
            .spawn(move || worker.run(message_receiver))
            .expect("failed to spawn batch flusher thread");

        BatchSpanProcessor {
            queue,
            counters,
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// The queue request threads enqueue finalized spans into.
    pub fn queue(&self) -> Arc<SpanQueue> {
        self.queue.clone()
    }

    /// Pipeline health counters.
    pub fn counters(&self) -> Arc<TelemetryCounters> {
        self.counters.clone()
    }

    /// Synchronously drain everything currently queued, bounded by the force
    /// flush timeout.
    pub fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::Other("processor already shut down".into()));
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::ForceFlush(sender))
            .map_err(|_| TraceError::Other("failed to send force flush message".into()))?;

        receiver
            .recv_timeout(self.forceflush_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.forceflush_timeout))?
    }

    /// Shut down with the default bounded wait.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.shutdown_with_timeout(self.shutdown_timeout)
    }

    /// Final flush bounded by `timeout`, then stop the flusher thread.
    ///
    /// Whatever is still queued when the budget lapses is counted dropped
    /// and abandoned; this call never hangs process exit. Export errors
    /// during the final flush are counted, not returned. Calling shutdown a
    /// second time returns [`ShutdownError::AlreadyShutdown`].
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), ShutdownError> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ShutdownError::AlreadyShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::Shutdown(sender))
            .map_err(|_| {
                ShutdownError::Other("failed to send shutdown message to flusher".into())
            })?;

        match receiver.recv_timeout(timeout) {
            Ok(flush_result) => {
                if let Err(err) = flush_result {
                    tk_debug!(name: "batch_flusher.shutdown_flush_failed", reason = err.to_string());
                }
                if let Some(handle) = self.handle.lock()?.take() {
                    let _ = handle.join();
                }
                Ok(())
            }
            Err(_) => {
                // Budget lapsed. Empty the queue so the stuck flusher finds
                // nothing more to export, and account for what we abandon.
                let abandoned = self.queue.drain(usize::MAX);
                if !abandoned.is_empty() {
                    self.counters.add_dropped(abandoned.len() as u64);
                }
                tk_warn!(
                    name: "batch_flusher.shutdown_timed_out",
                    abandoned = abandoned.len()
                );
                Err(ShutdownError::Timeout(timeout))
            }
        }
    }
}

struct Worker<E> {
    exporter: E,
    queue: Arc<SpanQueue>,
    counters: Arc<TelemetryCounters>,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    export_timeout: Duration,
}

impl<E: SpanExporter> Worker<E> {
    fn run(mut self, messages: Receiver<BatchMessage>) {
        let mut last_export = Instant::now();

        loop {
            let timeout = self.scheduled_delay.saturating_sub(last_export.elapsed());
            match messages.recv_timeout(timeout) {
                Ok(BatchMessage::BatchReady) => {
                    while self.queue.len() >= self.max_export_batch_size {
                        let _ = self.export_one_batch();
                        last_export = Instant::now();
                    }
                }
                Ok(BatchMessage::ForceFlush(sender)) => {
                    let result = self.drain_queue();
                    last_export = Instant::now();
                    let _ = sender.send(result);
                }
                Ok(BatchMessage::Shutdown(sender)) => {
                    let result = self.drain_queue();
                    self.exporter.shutdown();
                    let _ = sender.send(result);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let _ = self.export_one_batch();
                    last_export = Instant::now();
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Export batch after batch until the queue is empty, reporting the
    /// first failure.
    fn drain_queue(&mut self) -> TraceResult<()> {
        let mut result = Ok(());
        loop {
            let batch = self.queue.drain(self.max_export_batch_size);
            if batch.is_empty() {
                return result;
            }
            if let Err(err) = self.export_batch(batch) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
    }

    fn export_one_batch(&mut self) -> TraceResult<()> {
        let batch = self.queue.drain(self.max_export_batch_size);
        if batch.is_empty() {
            return Ok(());
        }
        self.export_batch(batch)
    }

    /// Drive one export to completion, racing it against the export
    /// timeout. A failed or timed-out batch is discarded and counted.
    fn export_batch(&mut self, batch: Vec<SpanRecord>) -> TraceResult<()> {
        let count = batch.len() as u64;
        let export = self.exporter.export(batch);
        let deadline = Box::pin(Delay::new(self.export_timeout));

        let result = match block_on(future::select(export, deadline)) {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => Err(TraceError::ExportTimedOut(self.export_timeout)),
        };

        match result {
            Ok(()) => {
                self.counters.add_exported(count);
                Ok(())
            }
            Err(err) => {
                self.counters.add_export_failure();
                self.counters.add_dropped(count);
                tk_warn!(
                    name: "batch_flusher.export_failed",
                    spans = count,
                    reason = err.to_string()
                );
                Err(err)
            }
        }
    }
}
