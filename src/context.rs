//! Trace identity types.
//!
//! A [`TraceContext`] is the immutable (trace id, span id, sampled-flag)
//! triple that identifies a position within a trace. It is what crosses
//! process boundaries via the [`propagation`](crate::propagation) module, and
//! what links a span to its parent. The trace id is fixed at the root span
//! and inherited unchanged by every descendant.

use std::fmt;
use std::num::ParseIntError;
use std::ops::{BitAnd, BitOr};

/// A 16-byte value which identifies a given trace.
///
/// The id is valid if it is non-zero.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value which identifies a given span.
///
/// The id is valid if it is non-zero.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this span id as a byte array.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Flags that can be set on a [`TraceContext`].
///
/// The current version of the specification only supports a single flag
/// [`TraceFlags::SAMPLED`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the `sampled` flag set to `false`.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0);

    /// Trace flags with the `sampled` flag set to `true`.
    pub const SAMPLED: TraceFlags = TraceFlags(1);

    /// Construct new trace flags.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns a copy of the flags with the `sampled` flag set.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            *self | TraceFlags::SAMPLED
        } else {
            self.bitand(!TraceFlags::SAMPLED.0)
        }
    }

    fn bitand(&self, other: u8) -> Self {
        TraceFlags(self.0 & other)
    }

    /// Returns the flags as a `u8`.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Immutable position within a trace, as propagated across process
/// boundaries.
///
/// A context is valid when both its trace id and span id are non-zero. Spans
/// whose context does not have the `sampled` flag set will be ignored by most
/// tracing backends.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
}

impl TraceContext {
    /// An invalid trace context.
    pub const NONE: TraceContext = TraceContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
    };

    /// Construct a new `TraceContext`.
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags) -> Self {
        TraceContext {
            trace_id,
            span_id,
            trace_flags,
        }
    }

    /// The [`TraceId`] for this context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] for this context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Flags details about the trace, currently only the sampled bit.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if the context has a non-zero `trace_id` and a non-zero
    /// `span_id`.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// Derive the context of a child span: same trace id and flags, new span
    /// id.
    pub fn child(&self, span_id: SpanId) -> Self {
        TraceContext {
            trace_id: self.trace_id,
            span_id,
            trace_flags: self.trace_flags,
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        TraceContext::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_hex_round_trip() {
        let id = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
        assert_eq!(id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(TraceId::from(0u128), TraceId::INVALID);
    }

    #[test]
    fn span_id_zero_pads() {
        let id = SpanId::from(0x00f0_67aa_0ba9_02b7u64);
        assert_eq!(id.to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn sampled_flag() {
        assert!(TraceFlags::SAMPLED.is_sampled());
        assert!(!TraceFlags::NOT_SAMPLED.is_sampled());
        assert!(TraceFlags::new(0xff).is_sampled());
        assert!(!TraceFlags::new(0xfe).with_sampled(false).is_sampled());
    }

    #[test]
    fn child_keeps_trace_id_and_flags() {
        let root = TraceContext::new(
            TraceId::from(1u128),
            SpanId::from(2u64),
            TraceFlags::SAMPLED,
        );
        let child = root.child(SpanId::from(3u64));
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.trace_flags(), root.trace_flags());
        assert_ne!(child.span_id(), root.span_id());
    }

    #[test]
    fn validity_requires_both_ids() {
        assert!(!TraceContext::NONE.is_valid());
        let half = TraceContext::new(TraceId::from(1u128), SpanId::INVALID, TraceFlags::SAMPLED);
        assert!(!half.is_valid());
    }
}
