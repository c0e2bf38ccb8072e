//! Route template discovery.

use std::fmt;

use crate::middleware::RequestHead;
use crate::normalize::normalize;

/// Resolves the low-cardinality route template a request was dispatched to.
///
/// Host frameworks with a real route table (`/users/{id}` and friends) should
/// implement this against that table; everything downstream, span naming
/// included, depends only on this capability, so route lookup lives in one
/// adapter per framework instead of being re-derived ad hoc.
pub trait RouteMatcher: Send + Sync + fmt::Debug {
    /// The route template for this request, or `None` if no route matched.
    fn matched_route(&self, request: &RequestHead) -> Option<String>;
}

/// Fallback matcher for hosts without route metadata: derives a template
/// from the raw path via [`normalize`].
#[derive(Clone, Debug, Default)]
pub struct NormalizedPathRoute {
    _private: (),
}

impl NormalizedPathRoute {
    /// Create a new `NormalizedPathRoute`.
    pub fn new() -> Self {
        NormalizedPathRoute { _private: () }
    }
}

impl RouteMatcher for NormalizedPathRoute {
    fn matched_route(&self, request: &RequestHead) -> Option<String> {
        if request.path.is_empty() {
            return None;
        }
        Some(normalize(&request.path).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_raw_paths() {
        let matcher = NormalizedPathRoute::new();
        let request = RequestHead::new("GET", "/users/42");
        assert_eq!(matcher.matched_route(&request).as_deref(), Some("/users/:id"));
    }

    #[test]
    fn empty_path_matches_nothing() {
        let matcher = NormalizedPathRoute::new();
        let request = RequestHead::new("GET", "");
        assert_eq!(matcher.matched_route(&request), None);
    }
}
