//! W3C-style `traceparent` propagation.

use crate::context::{SpanId, TraceContext, TraceFlags, TraceId};
use crate::propagation::{Extractor, Injector};

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;

/// Carrier key under which the trace context travels.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// A propagator moves a [`TraceContext`] into and out of a string-keyed
/// carrier.
pub trait TextMapPropagator: Send + Sync + std::fmt::Debug {
    /// Parse a context out of the carrier. Malformed or missing input yields
    /// `None`, never an error.
    fn extract(&self, extractor: &dyn Extractor) -> Option<TraceContext>;

    /// Encode the context into the carrier, overwriting any existing value.
    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector);
}

/// Propagates a [`TraceContext`] as a 4-field dash-delimited `traceparent`
/// value, understood across vendors:
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// The four fields are version, 32-hex trace id, 16-hex span id, and 2-hex
/// flags. Extraction is total: anything that does not parse is treated as an
/// absent context so the caller starts a fresh root instead of failing the
/// request.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    fn extract_trace_context(&self, extractor: &dyn Extractor) -> Option<TraceContext> {
        let header_value = extractor.get(TRACEPARENT_HEADER)?.trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return None;
        }

        // Version must parse, be within range, and for version 0 there must
        // be exactly 4 fields.
        if parts[0].len() != 2 || !is_lowercase_hex(parts[0]) {
            return None;
        }
        let version = u8::from_str_radix(parts[0], 16).ok()?;
        if version > MAX_VERSION || (version == 0 && parts.len() != 4) {
            return None;
        }

        // Fixed-width lowercase hex for trace id, span id and flags.
        if parts[1].len() != 32 || !is_lowercase_hex(parts[1]) {
            return None;
        }
        let trace_id = TraceId::from_hex(parts[1]).ok()?;

        if parts[2].len() != 16 || !is_lowercase_hex(parts[2]) {
            return None;
        }
        let span_id = SpanId::from_hex(parts[2]).ok()?;

        if parts[3].len() != 2 || !is_lowercase_hex(parts[3]) {
            return None;
        }
        let opts = u8::from_str_radix(parts[3], 16).ok()?;

        // Keep only the sampled bit; other flag bits are not defined.
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let context = TraceContext::new(trace_id, span_id, trace_flags);
        if context.is_valid() {
            Some(context)
        } else {
            None
        }
    }
}

fn is_lowercase_hex(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl TextMapPropagator for TraceContextPropagator {
    fn extract(&self, extractor: &dyn Extractor) -> Option<TraceContext> {
        self.extract_trace_context(extractor)
    }

    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector) {
        if context.is_valid() {
            let header_value = format!(
                "{:02x}-{:032x}-{:016x}-{:02x}",
                SUPPORTED_VERSION,
                context.trace_id(),
                context.span_id(),
                context.trace_flags() & TraceFlags::SAMPLED,
            );
            injector.set(TRACEPARENT_HEADER, header_value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[rustfmt::skip]
    fn extract_data() -> Vec<(&'static str, TraceContext)> {
        vec![
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", TraceContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::default())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", TraceContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED)),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", TraceContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED)),
            // Flags beyond the sampled bit are masked off.
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09", TraceContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED)),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-08", TraceContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::default())),
            // Later versions may carry extra fields.
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-XYZxsf09", TraceContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736), SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED)),
        ]
    }

    #[rustfmt::skip]
    fn extract_data_invalid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0000-00000000000000000000000000000000-0000000000000000-01", "wrong version length"),
            ("00-ab00000000000000000000000000000000-cd00000000000000-01", "wrong trace ID length"),
            ("00-ab000000000000000000000000000000-cd0000000000000000-01", "wrong span ID length"),
            ("00-ab000000000000000000000000000000-cd00000000000000-0100", "wrong trace flag length"),
            ("qw-00000000000000000000000000000000-0000000000000000-01",   "bogus version"),
            ("00-qw000000000000000000000000000000-cd00000000000000-01",   "bogus trace ID"),
            ("00-ab000000000000000000000000000000-qw00000000000000-01",   "bogus span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-qw",   "bogus trace flag"),
            ("A0-00000000000000000000000000000000-0000000000000000-01",   "upper case version"),
            ("00-AB000000000000000000000000000000-cd00000000000000-01",   "upper case trace ID"),
            ("00-ab000000000000000000000000000000-CD00000000000000-01",   "upper case span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-A1",   "upper case trace flag"),
            ("00-00000000000000000000000000000000-0000000000000000-01",   "zero trace ID and span ID"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",      "missing options"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-",     "empty options"),
            ("",                                                          "empty header"),
            ("   ",                                                       "whitespace only"),
            ("00",                                                        "too few parts"),
            ("00--4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",  "double separator"),
        ]
    }

    fn carrier_with(value: &str) -> HashMap<String, String> {
        let mut carrier = HashMap::new();
        carrier.insert(TRACEPARENT_HEADER.to_string(), value.to_string());
        carrier
    }

    #[test]
    fn extract_valid_headers() {
        let propagator = TraceContextPropagator::new();

        for (header, expected) in extract_data() {
            let carrier = carrier_with(header);
            assert_eq!(propagator.extract(&carrier), Some(expected), "{header}");
        }
    }

    #[test]
    fn extract_rejects_invalid() {
        let propagator = TraceContextPropagator::new();

        for (invalid_header, reason) in extract_data_invalid() {
            let carrier = carrier_with(invalid_header);
            assert_eq!(propagator.extract(&carrier), None, "{reason}");
        }
    }

    #[test]
    fn extract_missing_header() {
        let propagator = TraceContextPropagator::new();
        let carrier: HashMap<String, String> = HashMap::new();
        assert_eq!(propagator.extract(&carrier), None);
    }

    #[test]
    fn extract_is_case_insensitive_on_the_key() {
        let propagator = TraceContextPropagator::new();
        let mut carrier = HashMap::new();
        Injector::set(
            &mut carrier,
            "TraceParent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        assert!(propagator.extract(&carrier).is_some());
    }

    #[test]
    fn inject_writes_four_fields() {
        let propagator = TraceContextPropagator::new();
        let context = TraceContext::new(
            TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
            SpanId::from(0x00f0_67aa_0ba9_02b7),
            TraceFlags::SAMPLED,
        );

        let mut carrier = HashMap::new();
        propagator.inject(&context, &mut carrier);

        assert_eq!(
            Extractor::get(&carrier, TRACEPARENT_HEADER),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );
    }

    #[test]
    fn inject_masks_unknown_flags_and_skips_invalid() {
        let propagator = TraceContextPropagator::new();

        let noisy_flags = TraceContext::new(
            TraceId::from(1u128),
            SpanId::from(2u64),
            TraceFlags::new(0xff),
        );
        let mut carrier = HashMap::new();
        propagator.inject(&noisy_flags, &mut carrier);
        let header = Extractor::get(&carrier, TRACEPARENT_HEADER).unwrap();
        assert!(header.ends_with("-01"), "{header}");

        let mut empty = HashMap::new();
        propagator.inject(&TraceContext::NONE, &mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn inject_overwrites_existing_header() {
        let propagator = TraceContextPropagator::new();
        let mut carrier = carrier_with("00-ab000000000000000000000000000000-cd00000000000000-01");

        let context = TraceContext::new(
            TraceId::from(0x1234u128),
            SpanId::from(0x5678u64),
            TraceFlags::SAMPLED,
        );
        propagator.inject(&context, &mut carrier);

        assert_eq!(
            Extractor::get(&carrier, TRACEPARENT_HEADER),
            Some("00-00000000000000000000000000001234-0000000000005678-01")
        );
    }

    #[test]
    fn round_trip_law() {
        let propagator = TraceContextPropagator::new();
        let contexts = vec![
            TraceContext::new(TraceId::from(1u128), SpanId::from(1u64), TraceFlags::SAMPLED),
            TraceContext::new(
                TraceId::from(u128::MAX),
                SpanId::from(u64::MAX),
                TraceFlags::NOT_SAMPLED,
            ),
            TraceContext::new(
                TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
                SpanId::from(0x00f0_67aa_0ba9_02b7),
                TraceFlags::SAMPLED,
            ),
        ];

        for context in contexts {
            let mut carrier = HashMap::new();
            propagator.inject(&context, &mut carrier);
            assert_eq!(propagator.extract(&carrier), Some(context));
        }
    }
}
