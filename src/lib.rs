//! Request-scoped tracing middleware with bounded, batched span export.
//!
//! `tracekit` unifies the two pieces of tracing logic every framework
//! integration otherwise reimplements:
//!
//! * a [`middleware`] layer that owns the root span for one request: route
//!   based naming via [`normalize`], inbound context extraction via
//!   [`propagation`], a `Created -> Active -> Finalizing -> Ended` lifecycle
//!   finalized exactly once on every exit path;
//! * a [`processor`] that buffers finalized spans in a bounded queue and
//!   exports them in batches from a dedicated background thread, dropping
//!   rather than blocking under overload.
//!
//! Telemetry is strictly best-effort: no failure in this crate becomes a
//! user-visible failure, and buffered spans are lost on crash by design
//! (at-most-once delivery).
//!
//! ```
//! use tracekit::export::InMemorySpanExporter;
//! use tracekit::{KeyValue, Pipeline, RequestHead, ResponseHead};
//!
//! let exporter = InMemorySpanExporter::default();
//! let pipeline = Pipeline::builder()
//!     .with_service_name("checkout")
//!     .build(exporter.clone());
//!
//! let request = RequestHead::new("GET", "/users/42");
//! let response = pipeline
//!     .service()
//!     .call::<_, std::convert::Infallible>(&request, |span| {
//!         span.set_attribute(KeyValue::new("app.tenant", "acme"));
//!         // ... handler logic; `span.inject(...)` before outbound calls
//!         Ok(ResponseHead::new(200))
//!     });
//! assert!(response.is_ok());
//!
//! pipeline.force_flush().unwrap();
//! let spans = exporter.get_finished_spans().unwrap();
//! assert_eq!(spans[0].name(), "GET /users/:id");
//! pipeline.shutdown().unwrap();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod id_generator;
mod macros;
pub mod middleware;
pub mod normalize;
pub mod processor;
pub mod propagation;
pub mod semconv;
pub mod shutdown;
pub mod span;

/// Re-exports used by the internal logging macros; not public API.
#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, warn};
}

use std::sync::Arc;
use std::time::Duration;

pub use config::{Config, ConfigBuilder, DropPolicy};
pub use context::{SpanId, TraceContext, TraceFlags, TraceId};
pub use error::{ShutdownError, TraceError, TraceResult};
pub use export::{ExportResult, SpanExporter};
pub use middleware::interceptor::CallInterceptor;
pub use middleware::{
    ChildSpan, NormalizedPathRoute, RequestHead, ResponseHead, RouteMatcher, SpanHandle,
    TracedService,
};
pub use processor::{BatchSpanProcessor, CountersSnapshot, SpanQueue};
pub use shutdown::ShutdownCoordinator;
pub use span::{Event, KeyValue, SpanKind, SpanRecord, Status, Value};

use id_generator::IdGenerator;

/// A fully wired tracing pipeline: middleware, queue, flusher and shutdown.
#[derive(Debug)]
pub struct Pipeline {
    service: TracedService,
    processor: BatchSpanProcessor,
    coordinator: ShutdownCoordinator,
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The middleware to wrap request handlers with.
    pub fn service(&self) -> &TracedService {
        &self.service
    }

    /// The queue shared between the middleware and the flusher.
    pub fn queue(&self) -> Arc<SpanQueue> {
        self.processor.queue()
    }

    /// A snapshot of the pipeline health counters.
    pub fn counters(&self) -> CountersSnapshot {
        self.processor.counters().snapshot()
    }

    /// Synchronously export everything currently queued.
    pub fn force_flush(&self) -> TraceResult<()> {
        self.processor.force_flush()
    }

    /// Final bounded-time flush; anything not exported within the budget is
    /// dropped rather than hanging process exit.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.coordinator.shutdown(&self.processor)
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    config: Option<Config>,
    matcher: Option<Box<dyn RouteMatcher>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    shutdown_budget: Option<Duration>,
}

impl PipelineBuilder {
    /// Use a prepared [`Config`] instead of defaults plus environment
    /// overrides.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the logical service name recorded on every root span.
    pub fn with_service_name(mut self, service_name: impl Into<std::borrow::Cow<'static, str>>) -> Self {
        let mut config = self.config.take().unwrap_or_default();
        config.service_name = service_name.into();
        self.config = Some(config);
        self
    }

    /// Use a host-framework route matcher instead of raw path normalization.
    pub fn with_route_matcher(mut self, matcher: Box<dyn RouteMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Use a custom id generator.
    pub fn with_id_generator(mut self, id_generator: Box<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Set the total wall-clock budget for the final flush at shutdown.
    pub fn with_shutdown_budget(mut self, budget: Duration) -> Self {
        self.shutdown_budget = Some(budget);
        self
    }

    /// Wire everything together around `exporter` and start the flusher.
    pub fn build<E>(self, exporter: E) -> Pipeline
    where
        E: SpanExporter + 'static,
    {
        let config = self.config.unwrap_or_default();
        let processor = BatchSpanProcessor::new(exporter, &config);

        let mut service = TracedService::new(&config, processor.queue());
        if let Some(matcher) = self.matcher {
            service = service.with_matcher(matcher);
        }
        if let Some(id_generator) = self.id_generator {
            service = service.with_id_generator(id_generator);
        }

        let coordinator = match self.shutdown_budget {
            Some(budget) => ShutdownCoordinator::with_budget(budget),
            None => ShutdownCoordinator::new(),
        };

        Pipeline {
            service,
            processor,
            coordinator,
        }
    }
}
