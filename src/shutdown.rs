//! Bounded-time flush at process exit.

use std::time::Duration;

use crate::error::ShutdownError;
use crate::processor::BatchSpanProcessor;
use crate::tk_debug;

/// Coordinates the final flush when the process exits.
///
/// Delivery is at-most-once by design: the coordinator spends up to its
/// budget draining the queue through the exporter, then abandons whatever is
/// left rather than holding up exit. Abandoned spans are counted dropped.
#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    budget: Duration,
}

impl ShutdownCoordinator {
    /// Default total wait budget for the final flush.
    pub const DEFAULT_BUDGET: Duration = Duration::from_secs(5);

    /// Create a coordinator with the default budget.
    pub fn new() -> Self {
        Self::with_budget(Self::DEFAULT_BUDGET)
    }

    /// Create a coordinator with a custom total wait budget.
    pub fn with_budget(budget: Duration) -> Self {
        ShutdownCoordinator { budget }
    }

    /// The total wall-clock budget for the final flush.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Flush and stop the processor within the budget.
    ///
    /// Returns `Ok` when the queue drained in time, and
    /// [`ShutdownError::Timeout`] when the budget lapsed first; either way
    /// the call returns within the budget plus scheduling slack, and the
    /// process is free to exit.
    pub fn shutdown(&self, processor: &BatchSpanProcessor) -> Result<(), ShutdownError> {
        tk_debug!(name: "shutdown.begin", budget_ms = self.budget.as_millis() as u64);
        processor.shutdown_with_timeout(self.budget)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::export::InMemorySpanExporter;
    use crate::processor::BatchSpanProcessor;

    #[test]
    fn drains_pending_spans_within_budget() {
        let exporter = InMemorySpanExporter::default();
        let config = ConfigBuilder::default()
            .with_scheduled_delay(Duration::from_secs(60))
            .build();
        let processor = BatchSpanProcessor::new(exporter.clone(), &config);

        let ctx = crate::context::TraceContext::new(
            crate::context::TraceId::from(1u128),
            crate::context::SpanId::from(1u64),
            crate::context::TraceFlags::SAMPLED,
        );
        let mut span =
            crate::span::SpanRecord::start(ctx, None, "final", crate::span::SpanKind::Internal);
        span.activate();
        span.end();
        processor.queue().enqueue(span);

        let coordinator = ShutdownCoordinator::with_budget(Duration::from_secs(2));
        coordinator.shutdown(&processor).unwrap();
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn repeated_shutdown_is_rejected() {
        let config = ConfigBuilder::default().build();
        let processor = BatchSpanProcessor::new(InMemorySpanExporter::default(), &config);

        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown(&processor).unwrap();
        assert!(matches!(
            coordinator.shutdown(&processor),
            Err(ShutdownError::AlreadyShutdown)
        ));
    }
}
