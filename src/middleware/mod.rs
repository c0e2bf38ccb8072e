//! Request span lifecycle.
//!
//! [`TracedService`] wraps a request handler and owns the root span for one
//! request: it extracts the inbound trace context, names the span from the
//! matched route, walks the record through
//! `Created -> Active -> Finalizing -> Ended`, and hands the finalized record
//! to the export queue. Finalization happens exactly once on every exit path
//! (normal return, handler error, or panic), and the error paths propagate
//! the failure to the caller unchanged. Tracing must never alter what the
//! handler returns.
//!
//! The active span travels as a per-request [`SpanHandle`] frame passed to
//! the handler, not as process-global state, so concurrent requests cannot
//! observe each other's context.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::context::{TraceContext, TraceFlags};
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::processor::SpanQueue;
use crate::propagation::{Injector, TextMapPropagator, TraceContextPropagator};
use crate::semconv;
use crate::span::{KeyValue, SpanKind, SpanRecord, Status};

pub mod interceptor;
mod route;

pub use route::{NormalizedPathRoute, RouteMatcher};

/// Framework-neutral snapshot of an inbound request.
///
/// `headers` doubles as the extraction carrier for the inbound trace
/// context; keys are matched case-insensitively through the carrier traits.
#[derive(Clone, Debug)]
pub struct RequestHead {
    /// Request method, uppercase by convention (`GET`, `POST`, ...).
    pub method: String,
    /// Request path with the query string already stripped.
    pub path: String,
    /// URI scheme, if known.
    pub scheme: Option<String>,
    /// Host the request was addressed to, if known.
    pub host: Option<String>,
    /// The client's `User-Agent`, if sent.
    pub user_agent: Option<String>,
    /// Network address of the immediate client, if known.
    pub client_addr: Option<String>,
    /// Request body size in bytes, if known.
    pub body_size: Option<u64>,
    /// Request headers, lowercase keys.
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    /// Create a new `RequestHead` with the given method and path.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        RequestHead {
            method: method.into(),
            path: path.into(),
            scheme: None,
            host: None,
            user_agent: None,
            client_addr: None,
            body_size: None,
            headers: HashMap::new(),
        }
    }

    /// Add a header, normalizing the key to lowercase.
    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        Injector::set(&mut self.headers, key, value.into());
        self
    }
}

/// Framework-neutral response outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code of the response.
    pub status_code: u16,
}

impl ResponseHead {
    /// Create a new `ResponseHead` with the given status code.
    pub fn new(status_code: u16) -> Self {
        ResponseHead { status_code }
    }
}

/// Map an HTTP status code to a span status.
///
/// 1xx-3xx map to `Ok`; client and server errors map to `Error` with an
/// `HTTP <code>` message; codes outside the valid range are flagged as such.
pub fn status_for_http_code(code: u16) -> Status {
    if code < 100 || code >= 600 {
        Status::error(format!("Invalid status code {code}"))
    } else if code >= 400 {
        Status::error(format!("HTTP {code}"))
    } else {
        Status::Ok
    }
}

/// Shared per-request references handed down to child spans.
#[derive(Clone, Copy)]
struct SpanScope<'a> {
    queue: &'a SpanQueue,
    id_generator: &'a dyn IdGenerator,
    propagator: &'a dyn TextMapPropagator,
}

/// The active-context frame for one request.
///
/// Handed to the handler by [`TracedService::call`]; exposes the current
/// [`TraceContext`] for outbound propagation and lets the handler annotate
/// the root span or open child spans. Dropping the handle mid-unwind
/// finalizes the root span, so a panicking handler still produces exactly
/// one ended span.
pub struct SpanHandle<'a> {
    scope: SpanScope<'a>,
    context: TraceContext,
    record: Option<SpanRecord>,
}

impl<'a> SpanHandle<'a> {
    /// The identity of the request's root span, for outbound propagation
    /// and correlation.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// Write the current context into an outbound carrier.
    pub fn inject(&self, carrier: &mut dyn Injector) {
        self.scope.propagator.inject(&self.context, carrier);
    }

    /// Annotate the root span.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(record) = self.record.as_mut() {
            record.set_attribute(attribute);
        }
    }

    /// Record an event on the root span.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        if let Some(record) = self.record.as_mut() {
            record.add_event(name, attributes);
        }
    }

    /// Open a child span of the current context.
    ///
    /// The child finalizes into the same export queue when ended or dropped.
    pub fn start_child(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
    ) -> ChildSpan<'a> {
        ChildSpan::start(self.scope, &self.context, name, kind)
    }

    fn finalize_success(&mut self, status_code: u16) {
        if let Some(mut record) = self.record.take() {
            record.begin_finalizing();
            record.set_attribute(KeyValue::new(
                semconv::HTTP_RESPONSE_STATUS_CODE,
                status_code as i64,
            ));
            record.set_status(status_for_http_code(status_code));
            record.end();
            self.scope.queue.enqueue(record);
        }
    }

    fn finalize_error(&mut self, error_type: &'static str, message: String) {
        if let Some(mut record) = self.record.take() {
            record.begin_finalizing();
            record.add_event("exception", exception_attributes(error_type, &message));
            record.set_status(Status::error(message));
            record.end();
            self.scope.queue.enqueue(record);
        }
    }
}

impl Drop for SpanHandle<'_> {
    fn drop(&mut self) {
        // Normal exits finalize through `TracedService::call`; reaching here
        // with a live record means the handler unwound.
        if self.record.is_some() {
            self.finalize_error("panic", "handler panicked".to_string());
        }
    }
}

fn exception_attributes(error_type: &'static str, message: &str) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(semconv::EXCEPTION_TYPE, error_type),
        KeyValue::new(semconv::EXCEPTION_MESSAGE, message.to_string()),
    ];
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        attributes.push(KeyValue::new(
            semconv::EXCEPTION_STACKTRACE,
            backtrace.to_string(),
        ));
    }
    attributes
}

/// A child span opened within a request, finalized on [`end`](Self::end) or
/// drop.
pub struct ChildSpan<'a> {
    scope: SpanScope<'a>,
    context: TraceContext,
    record: Option<SpanRecord>,
}

impl<'a> ChildSpan<'a> {
    fn start(
        scope: SpanScope<'a>,
        parent: &TraceContext,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
    ) -> Self {
        let context = parent.child(scope.id_generator.new_span_id());
        let mut record = SpanRecord::start(context.clone(), Some(parent.span_id()), name, kind);
        record.activate();
        ChildSpan {
            scope,
            context,
            record: Some(record),
        }
    }

    /// The identity of this span, for outbound propagation.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// Write this span's context into an outbound carrier.
    pub fn inject(&self, carrier: &mut dyn Injector) {
        self.scope.propagator.inject(&self.context, carrier);
    }

    /// Annotate this span.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(record) = self.record.as_mut() {
            record.set_attribute(attribute);
        }
    }

    /// Record an event on this span.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        if let Some(record) = self.record.as_mut() {
            record.add_event(name, attributes);
        }
    }

    /// Set this span's status.
    pub fn set_status(&mut self, status: Status) {
        if let Some(record) = self.record.as_mut() {
            record.set_status(status);
        }
    }

    /// Record a failure of the traced operation: an `exception` event plus
    /// an error status.
    pub fn record_error(&mut self, error_type: &'static str, message: &str) {
        if let Some(record) = self.record.as_mut() {
            record.add_event("exception", exception_attributes(error_type, message));
            record.set_status(Status::error(message.to_string()));
        }
    }

    /// Open a nested child of this span.
    pub fn start_child(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
    ) -> ChildSpan<'a> {
        ChildSpan::start(self.scope, &self.context, name, kind)
    }

    /// End the span now and hand it to the export queue.
    pub fn end(mut self) {
        self.finalize();
    }

    fn finalize(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.end();
            self.scope.queue.enqueue(record);
        }
    }
}

impl Drop for ChildSpan<'_> {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Wraps request handlers with the root-span lifecycle.
///
/// One instance serves arbitrarily many concurrent requests; all per-request
/// state lives in the [`SpanHandle`] frame.
#[derive(Debug)]
pub struct TracedService {
    service_name: Cow<'static, str>,
    matcher: Box<dyn RouteMatcher>,
    propagator: Box<dyn TextMapPropagator>,
    id_generator: Box<dyn IdGenerator>,
    queue: Arc<SpanQueue>,
}

impl TracedService {
    pub(crate) fn new(config: &Config, queue: Arc<SpanQueue>) -> Self {
        TracedService {
            service_name: config.service_name.clone(),
            matcher: Box::new(NormalizedPathRoute::new()),
            propagator: Box::new(TraceContextPropagator::new()),
            id_generator: Box::new(RandomIdGenerator::default()),
            queue,
        }
    }

    pub(crate) fn with_matcher(mut self, matcher: Box<dyn RouteMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub(crate) fn with_id_generator(mut self, id_generator: Box<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Run `handler` inside a server span for `request`.
    ///
    /// The span is parented to the extracted inbound context when one is
    /// present and valid, and is a fresh sampled root otherwise. The
    /// handler's result is returned unchanged: an `Err` is recorded on the
    /// span and then propagated, a panic unwinds through after finalizing
    /// the span.
    pub fn call<F, E>(&self, request: &RequestHead, handler: F) -> Result<ResponseHead, E>
    where
        F: FnOnce(&mut SpanHandle<'_>) -> Result<ResponseHead, E>,
        E: std::fmt::Display,
    {
        let mut handle = self.open_span(request);
        let result = handler(&mut handle);

        match result {
            Ok(response) => {
                handle.finalize_success(response.status_code);
                Ok(response)
            }
            Err(error) => {
                handle.finalize_error(std::any::type_name::<E>(), error.to_string());
                Err(error)
            }
        }
    }

    fn open_span(&self, request: &RequestHead) -> SpanHandle<'_> {
        let parent = self.propagator.extract(&request.headers);
        let name = match self.matcher.matched_route(request) {
            Some(route) => format!("{} {}", request.method, route),
            None => format!("{} route not found", request.method),
        };

        let context = match &parent {
            Some(parent) => parent.child(self.id_generator.new_span_id()),
            None => TraceContext::new(
                self.id_generator.new_trace_id(),
                self.id_generator.new_span_id(),
                TraceFlags::SAMPLED,
            ),
        };

        let mut record = SpanRecord::start(
            context.clone(),
            parent.as_ref().map(|p| p.span_id()),
            name,
            SpanKind::Server,
        );
        record.set_attribute(KeyValue::new(
            semconv::SERVICE_NAME,
            self.service_name.clone(),
        ));
        record.set_attribute(KeyValue::new(
            semconv::HTTP_REQUEST_METHOD,
            request.method.clone(),
        ));
        record.set_attribute(KeyValue::new(semconv::URL_PATH, request.path.clone()));
        if let Some(scheme) = &request.scheme {
            record.set_attribute(KeyValue::new(semconv::URL_SCHEME, scheme.clone()));
        }
        if let Some(host) = &request.host {
            record.set_attribute(KeyValue::new(semconv::SERVER_ADDRESS, host.clone()));
        }
        if let Some(user_agent) = &request.user_agent {
            record.set_attribute(KeyValue::new(
                semconv::USER_AGENT_ORIGINAL,
                user_agent.clone(),
            ));
        }
        if let Some(client_addr) = &request.client_addr {
            record.set_attribute(KeyValue::new(semconv::CLIENT_ADDRESS, client_addr.clone()));
        }
        if let Some(body_size) = request.body_size {
            record.set_attribute(KeyValue::new(semconv::HTTP_REQUEST_BODY_SIZE, body_size));
        }
        record.activate();

        SpanHandle {
            scope: SpanScope {
                queue: &self.queue,
                id_generator: self.id_generator.as_ref(),
                propagator: self.propagator.as_ref(),
            },
            context,
            record: Some(record),
        }
    }
}
