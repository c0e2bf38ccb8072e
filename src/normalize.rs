//! Cardinality-safe span naming.
//!
//! Raw URL paths carry unbounded identifiers (`/users/42`,
//! `/orders/550e8400-…`), which makes them unusable as span names: every
//! request would create a new name. [`normalize`] rewrites such segments to
//! stable placeholders so one route yields one name.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

/// Substitution rules in priority order.
///
/// Date and epoch-timestamp rules run before the generic numeric-id rule;
/// otherwise a `/1700000000/` segment is tagged `:id` before the timestamp
/// rule ever sees it.
fn rules() -> &'static [Rule; 6] {
    static RULES: OnceLock<[Rule; 6]> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |pattern: &str, replacement: &'static str| Rule {
            pattern: Regex::new(pattern).expect("hardcoded normalization pattern"),
            replacement,
        };
        [
            // UUIDs, anywhere in the path, any case.
            rule(
                "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
                ":uuid",
            ),
            // Date segments (YYYY-MM-DD).
            rule(r"/\d{4}-\d{2}-\d{2}(/|$)", "/:date$1"),
            // Unix epoch timestamps, seconds through milliseconds.
            rule(r"/\d{10,13}(/|$)", "/:timestamp$1"),
            // Generic numeric ids.
            rule(r"/\d+(/|$)", "/:id$1"),
            // GUIDs without dashes.
            rule(r"/[0-9a-fA-F]{32}(/|$)", "/:guid$1"),
            // Language codes (e.g. en-US, fr, de-DE).
            rule(r"/[a-z]{2}(-[A-Z]{2})?(/|$)", "/:lang$2"),
        ]
    })
}

/// Apply one rule until it finds nothing further to replace.
///
/// A single `replace_all` pass skips a segment whose leading `/` was consumed
/// as the previous match's boundary (`/1/2/3`), so each rule is re-run until
/// stable. Placeholders contain no digits or two-letter segments, so no rule
/// re-matches its own output and the loop terminates.
fn apply(rule: &Rule, path: &str) -> Option<String> {
    let mut replaced: Option<String> = None;
    loop {
        let current = replaced.as_deref().unwrap_or(path);
        match rule.pattern.replace_all(current, rule.replacement) {
            Cow::Borrowed(_) => return replaced,
            Cow::Owned(next) => replaced = Some(next),
        }
    }
}

/// Normalize a raw URL path (query string already stripped) into a
/// cardinality-safe template.
///
/// Never fails: input that matches no rule is returned unchanged, `"/"` stays
/// `"/"`, and a trailing slash is stripped. Idempotent: normalizing an
/// already-normalized path is a no-op.
///
/// ```
/// use tracekit::normalize::normalize;
///
/// assert_eq!(normalize("/users/42/"), "/users/:id");
/// assert_eq!(normalize("/reports/2024-01-15/7"), "/reports/:date/:id");
/// assert_eq!(normalize("/healthz"), "/healthz");
/// ```
pub fn normalize(path: &str) -> Cow<'_, str> {
    let mut normalized: Option<String> = None;
    for rule in rules() {
        let current = normalized.as_deref().unwrap_or(path);
        if let Some(next) = apply(rule, current) {
            normalized = Some(next);
        }
    }

    match normalized {
        Some(mut owned) => {
            if owned.len() > 1 && owned.ends_with('/') {
                owned.pop();
            }
            Cow::Owned(owned)
        }
        None if path.len() > 1 && path.ends_with('/') => Cow::Borrowed(&path[..path.len() - 1]),
        None => Cow::Borrowed(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn normalize_data() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/", "/"),
            ("", ""),
            ("/users/42", "/users/:id"),
            ("/users/42/", "/users/:id"),
            ("/users/42/posts/7", "/users/:id/posts/:id"),
            ("/1/2/3", "/:id/:id/:id"),
            ("/users/550e8400-e29b-41d4-a716-446655440000", "/users/:uuid"),
            ("/users/550E8400-E29B-41D4-A716-446655440000/posts", "/users/:uuid/posts"),
            ("/reports/2024-01-15", "/reports/:date"),
            ("/events/1700000000", "/events/:timestamp"),
            ("/events/1700000000123", "/events/:timestamp"),
            ("/blobs/0123456789abcdef0123456789abcdef", "/blobs/:guid"),
            ("/en-US/home", "/:lang/home"),
            ("/fr/", "/:lang"),
            ("/v1/users/9", "/v1/users/:id"),
            ("/healthz", "/healthz"),
            ("no-leading-slash", "no-leading-slash"),
        ]
    }

    #[test]
    fn normalizes_known_patterns() {
        for (raw, expected) in normalize_data() {
            assert_eq!(normalize(raw), expected, "input: {raw:?}");
        }
    }

    #[test]
    fn date_rule_wins_over_numeric_id() {
        // A date followed immediately by a numeric segment must not be
        // mis-tagged as an id.
        assert_eq!(normalize("/reports/2024-01-15/42"), "/reports/:date/:id");
        assert_eq!(normalize("/2024-01-15/2024-01-16"), "/:date/:date");
    }

    #[test]
    fn timestamp_rule_wins_over_numeric_id() {
        assert_eq!(normalize("/jobs/1700000000/7"), "/jobs/:timestamp/:id");
        // 14 digits is too long for an epoch timestamp and falls back to :id.
        assert_eq!(normalize("/jobs/17000000001234"), "/jobs/:id");
    }

    #[test]
    fn idempotent_for_all_inputs() {
        for (raw, _) in normalize_data() {
            let once = normalize(raw).into_owned();
            let twice = normalize(&once);
            assert_eq!(once, twice, "input: {raw:?}");
        }
    }

    #[test]
    fn unmatched_input_is_borrowed() {
        assert!(matches!(normalize("/healthz"), Cow::Borrowed(_)));
        assert!(matches!(normalize("/users/42"), Cow::Owned(_)));
    }
}
