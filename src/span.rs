//! Span data model.
//!
//! A [`SpanRecord`] is one timed unit of work: identity ([`TraceContext`]),
//! name, kind, timestamps, attributes, status and events. Records move
//! through the `Created -> Active -> Finalizing -> Ended` lifecycle exactly
//! once; `Ended` is terminal and is the only state in which a record may be
//! handed to the export queue.

use std::borrow::Cow;
use std::time::SystemTime;

use crate::context::{SpanId, TraceContext};

/// The kind of span, describing its relationship to its parent and children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// Handles an inbound request from a remote client.
    Server,
    /// Originates an outbound request to a remote service.
    Client,
    /// Publishes a message to an asynchronous consumer.
    Producer,
    /// Processes a message from an asynchronous producer.
    Consumer,
    /// An operation internal to the application.
    Internal,
}

/// The status of a finished span.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error.
        description: Cow<'static, str>,
    },

    /// The operation completed successfully.
    Ok,
}

impl Status {
    /// Create a new `Status::Error` with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A scalar attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(Cow<'static, str>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::I64(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::String(Cow::Borrowed(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Cow::Owned(value))
    }
}

impl From<Cow<'static, str>> for Value {
    fn from(value: Cow<'static, str>) -> Self {
        Value::String(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(f),
            Value::I64(v) => v.fmt(f),
            Value::F64(v) => v.fmt(f),
            Value::String(v) => v.fmt(f),
        }
    }
}

/// A key-value attribute pair.
///
/// Attribute collections preserve insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute key.
    pub key: Cow<'static, str>,
    /// The attribute value.
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The wall clock time at which the event occurred.
    pub timestamp: SystemTime,
    /// Attributes describing the event.
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// Create a new `Event`.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
        }
    }
}

/// The lifecycle of a span record.
///
/// `Ended` is terminal and entered exactly once; every other transition is a
/// no-op if attempted out of order (the first `end` wins).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Allocated at request entry, not yet observable by the handler.
    Created,
    /// Mutable by the handler and its descendants.
    Active,
    /// Response outcome is being recorded; no further handler mutation.
    Finalizing,
    /// Terminal. The record is immutable and ready for export.
    Ended,
}

/// One timed unit of work, finished or in flight.
#[derive(Clone, Debug)]
pub struct SpanRecord {
    context: TraceContext,
    parent_span_id: Option<SpanId>,
    name: Cow<'static, str>,
    kind: SpanKind,
    start_time: SystemTime,
    end_time: SystemTime,
    attributes: Vec<KeyValue>,
    status: Status,
    events: Vec<Event>,
    state: LifecycleState,
}

impl SpanRecord {
    /// Start a new record in the `Created` state with the current wall clock
    /// as its start time.
    pub fn start(
        context: TraceContext,
        parent_span_id: Option<SpanId>,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
    ) -> Self {
        let now = SystemTime::now();
        SpanRecord {
            context,
            parent_span_id,
            name: name.into(),
            kind,
            start_time: now,
            end_time: now,
            attributes: Vec::new(),
            status: Status::Unset,
            events: Vec::new(),
            state: LifecycleState::Created,
        }
    }

    /// The identity of this span within its trace.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// The span id of the parent, if this span is not a root.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// The span name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The span kind.
    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    /// Wall clock time at which the span started.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Wall clock time at which the span ended. Meaningful once `Ended`;
    /// never precedes [`start_time`](Self::start_time).
    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    /// The span status.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Events in insertion order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns `true` until the record has ended.
    pub fn is_recording(&self) -> bool {
        self.state != LifecycleState::Ended
    }

    /// Transition `Created -> Active`. Returns `false` if the record is in
    /// any other state.
    pub fn activate(&mut self) -> bool {
        if self.state == LifecycleState::Created {
            self.state = LifecycleState::Active;
            true
        } else {
            false
        }
    }

    /// Transition into `Finalizing`, the window in which the response outcome
    /// is recorded. No-op once ended.
    pub fn begin_finalizing(&mut self) {
        if self.state != LifecycleState::Ended {
            self.state = LifecycleState::Finalizing;
        }
    }

    /// Append an attribute. No-op once ended.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if self.is_recording() {
            self.attributes.push(attribute);
        }
    }

    /// Record an event at the current time. No-op once ended.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        if self.is_recording() {
            self.events
                .push(Event::new(name, SystemTime::now(), attributes));
        }
    }

    /// Set the span status. No-op once ended.
    pub fn set_status(&mut self, status: Status) {
        if self.is_recording() {
            self.status = status;
        }
    }

    /// End the span at the current wall clock time.
    ///
    /// Returns `true` on the transition into `Ended` and `false` on every
    /// later call, so callers racing on multiple exit paths finalize exactly
    /// once.
    pub fn end(&mut self) -> bool {
        self.end_with_timestamp(SystemTime::now())
    }

    /// End the span at the given time, clamped so `end_time >= start_time`.
    pub fn end_with_timestamp(&mut self, at: SystemTime) -> bool {
        if self.state == LifecycleState::Ended {
            return false;
        }
        self.state = LifecycleState::Finalizing;
        self.end_time = at.max(self.start_time);
        self.state = LifecycleState::Ended;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{TraceFlags, TraceId};

    fn test_record() -> SpanRecord {
        let ctx = TraceContext::new(
            TraceId::from(0xabcu128),
            SpanId::from(0x1u64),
            TraceFlags::SAMPLED,
        );
        SpanRecord::start(ctx, None, "GET /users/:id", SpanKind::Server)
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut record = test_record();
        assert_eq!(record.state(), LifecycleState::Created);
        assert!(record.activate());
        assert_eq!(record.state(), LifecycleState::Active);
        assert!(record.end());
        assert_eq!(record.state(), LifecycleState::Ended);
    }

    #[test]
    fn ends_exactly_once() {
        let mut record = test_record();
        record.activate();
        assert!(record.end());
        assert!(!record.end());
        assert!(!record.end_with_timestamp(SystemTime::now()));
    }

    #[test]
    fn end_time_never_precedes_start_time() {
        let mut record = test_record();
        record.activate();
        let past = record.start_time() - std::time::Duration::from_secs(60);
        assert!(record.end_with_timestamp(past));
        assert!(record.end_time() >= record.start_time());
    }

    #[test]
    fn mutation_stops_after_end() {
        let mut record = test_record();
        record.activate();
        record.set_attribute(KeyValue::new("http.request.method", "GET"));
        record.end();
        record.set_attribute(KeyValue::new("late", true));
        record.add_event("late-event", Vec::new());
        record.set_status(Status::Ok);
        assert_eq!(record.attributes().len(), 1);
        assert!(record.events().is_empty());
        assert_eq!(record.status(), &Status::Unset);
    }

    #[test]
    fn activate_only_from_created() {
        let mut record = test_record();
        assert!(record.activate());
        assert!(!record.activate());
        record.end();
        assert!(!record.activate());
    }

    #[test]
    fn attributes_preserve_insertion_order() {
        let mut record = test_record();
        record.activate();
        record.set_attribute(KeyValue::new("b", 2i64));
        record.set_attribute(KeyValue::new("a", 1i64));
        let keys: Vec<_> = record.attributes().iter().map(|kv| kv.key.as_ref()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
