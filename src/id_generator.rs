//! Trace and span id generation.

use std::cell::RefCell;
use std::fmt;

use rand::{rngs, Rng, SeedableRng};

use crate::context::{SpanId, TraceId};

/// Interface for generating ids.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates trace and span ids using a random number generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| TraceId::from(rng.borrow_mut().gen::<u128>()))
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| SpanId::from(rng.borrow_mut().gen::<u64>()))
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_entropy());
}

/// [`IdGenerator`] implementation that increments a counter for each new id.
/// This helps produce predictable ids for testing.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct SequentialIdGenerator(std::sync::atomic::AtomicU64);

#[cfg(any(test, feature = "testing"))]
impl SequentialIdGenerator {
    /// Create a new `SequentialIdGenerator` starting at 1.
    pub fn new() -> Self {
        Self(std::sync::atomic::AtomicU64::new(0))
    }
}

#[cfg(any(test, feature = "testing"))]
impl IdGenerator for SequentialIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) as u128 + 1)
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1)
    }
}
