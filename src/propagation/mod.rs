//! Trace-context propagation across process boundaries.
//!
//! Propagators read and write the position of the current span to a
//! string-keyed carrier (request headers, message metadata) so a downstream
//! process can parent its spans into the same trace. [`Injector`] and
//! [`Extractor`] abstract over the carrier; transport-level header keys are
//! conventionally case-insensitive, so the built-in `HashMap` carrier
//! normalizes keys to lowercase on both sides.

use std::collections::HashMap;

mod trace_context;

pub use trace_context::{TextMapPropagator, TraceContextPropagator, TRACEPARENT_HEADER};

/// Injector provides an interface for writing fields into an underlying
/// carrier such as a `HashMap`.
pub trait Injector {
    /// Add a key and value to the underlying data, replacing any existing
    /// value at that key.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier such as a `HashMap`.
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap. Keys are normalized to lowercase.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap. Lookup is case-insensitive.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_get_is_case_insensitive() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "headerName", "value".to_string());

        assert_eq!(
            Extractor::get(&carrier, "HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        );
    }

    #[test]
    fn hash_map_set_overwrites() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "Traceparent", "old".to_string());
        Injector::set(&mut carrier, "traceparent", "new".to_string());

        assert_eq!(Extractor::get(&carrier, "traceparent"), Some("new"));
        assert_eq!(carrier.len(), 1);
    }

    #[test]
    fn hash_map_keys() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "headerName1", "value1".to_string());
        Injector::set(&mut carrier, "headerName2", "value2".to_string());

        let got = Extractor::keys(&carrier);
        assert_eq!(got.len(), 2);
        assert!(got.contains(&"headername1"));
        assert!(got.contains(&"headername2"));
    }
}
