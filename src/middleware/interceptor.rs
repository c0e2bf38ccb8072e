//! Explicit instrumentation of outbound calls.
//!
//! Integrations for DB drivers, HTTP clients, queue producers and the like
//! implement [`CallInterceptor`] and are composed deliberately at the call
//! site via [`SpanHandle::traced_call`], with no runtime patching of library
//! internals. The traced call gets its own child span with the context
//! already injected into the outbound carrier; errors are recorded and then
//! propagated to the caller unchanged.

use std::borrow::Cow;
use std::fmt;

use crate::middleware::{ChildSpan, SpanHandle};
use crate::propagation::Injector;
use crate::span::SpanKind;

/// Hooks around one outbound call.
///
/// All hooks receive the call's child span; `before_call` typically records
/// what is about to be called, `after_call` the outcome, and `on_error` any
/// integration-specific failure detail. Implementations must not block.
pub trait CallInterceptor: Send + Sync {
    /// Called after the child span is created and the context injected,
    /// before the call runs.
    fn before_call(&self, _span: &mut ChildSpan<'_>) {}

    /// Called when the call returned successfully, before the span ends.
    fn after_call(&self, _span: &mut ChildSpan<'_>) {}

    /// Called when the call failed, before the error is recorded on the
    /// span and propagated.
    fn on_error(&self, _span: &mut ChildSpan<'_>, _message: &str) {}
}

impl SpanHandle<'_> {
    /// Run an outbound call inside a child span.
    ///
    /// Opens a child of the current context, injects it into `carrier`,
    /// drives the interceptors around `call`, and returns the call's result
    /// unchanged. A failed call leaves an `exception` event and an error
    /// status on the child span.
    pub fn traced_call<T, E>(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        carrier: &mut dyn Injector,
        interceptors: &[&dyn CallInterceptor],
        call: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: fmt::Display,
    {
        let mut span = self.start_child(name, kind);
        span.inject(carrier);
        for interceptor in interceptors {
            interceptor.before_call(&mut span);
        }

        match call() {
            Ok(value) => {
                for interceptor in interceptors {
                    interceptor.after_call(&mut span);
                }
                span.end();
                Ok(value)
            }
            Err(error) => {
                let message = error.to_string();
                for interceptor in interceptors {
                    interceptor.on_error(&mut span, &message);
                }
                span.record_error(std::any::type_name::<E>(), &message);
                span.end();
                Err(error)
            }
        }
    }
}
