//! Subscription filter evaluation.
//!
//! A filter is a key -> expected-value map evaluated as a conjunction
//! against the event payload.  Scalars compare by exact equality.  Two
//! reserved keys apply strict time comparisons against the payload's
//! RFC 3339 `timestamp` field.  Anything structurally uncomparable (nested
//! maps, arrays) compares unequal with a diagnostic instead of faulting, so
//! hostile filters cannot take the publish path down.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// Reserved filter key: payload timestamp strictly after this instant.
pub const TIMESTAMP_AFTER: &str = "timestamp_after";
/// Reserved filter key: payload timestamp strictly before this instant.
pub const TIMESTAMP_BEFORE: &str = "timestamp_before";

/// True when every filter entry matches the payload.
pub fn matches(filters: &Map<String, Value>, payload: &Map<String, Value>) -> bool {
    filters.iter().all(|(key, expected)| match key.as_str() {
        TIMESTAMP_AFTER => temporal_matches(expected, payload, TemporalOp::After),
        TIMESTAMP_BEFORE => temporal_matches(expected, payload, TemporalOp::Before),
        _ => match payload.get(key) {
            Some(actual) => scalar_eq(key, expected, actual),
            None => false,
        },
    })
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn scalar_eq(key: &str, expected: &Value, actual: &Value) -> bool {
    if !is_scalar(expected) || !is_scalar(actual) {
        debug!(
            key,
            "filter value has uncomparable shape, treating as unequal"
        );
        return false;
    }
    expected == actual
}

#[derive(Clone, Copy)]
enum TemporalOp {
    After,
    Before,
}

fn temporal_matches(expected: &Value, payload: &Map<String, Value>, op: TemporalOp) -> bool {
    let Some(bound) = expected.as_str().and_then(parse_utc) else {
        debug!("temporal filter value is not an RFC 3339 timestamp");
        return false;
    };
    let Some(actual) = payload
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_utc)
    else {
        return false;
    };
    match op {
        TemporalOp::After => actual > bound,
        TemporalOp::Before => actual < bound,
    }
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().expect("test value is an object").clone()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&Map::new(), &map(json!({"device": "camera0"}))));
        assert!(matches(&Map::new(), &Map::new()));
    }

    #[test]
    fn scalar_conjunction_requires_all_keys() {
        let filters = map(json!({"device": "camera0", "status": "connected"}));
        assert!(matches(
            &filters,
            &map(json!({"device": "camera0", "status": "connected", "extra": 1}))
        ));
        assert!(!matches(
            &filters,
            &map(json!({"device": "camera0", "status": "error"}))
        ));
        assert!(!matches(&filters, &map(json!({"device": "camera0"}))));
    }

    #[test]
    fn missing_payload_key_fails_the_filter() {
        let filters = map(json!({"device": "camera0"}));
        assert!(!matches(&filters, &map(json!({"status": "connected"}))));
    }

    #[test]
    fn number_and_bool_scalars_compare_exactly() {
        let filters = map(json!({"fps": 30, "enabled": true}));
        assert!(matches(&filters, &map(json!({"fps": 30, "enabled": true}))));
        assert!(!matches(&filters, &map(json!({"fps": 25, "enabled": true}))));
    }

    #[test]
    fn nested_shapes_compare_unequal_without_panicking() {
        let filters = map(json!({"device": {"nested": true}}));
        assert!(!matches(&filters, &map(json!({"device": {"nested": true}}))));

        let filters = map(json!({"device": "camera0"}));
        assert!(!matches(&filters, &map(json!({"device": ["camera0"]}))));
    }

    #[test]
    fn timestamp_after_is_strict() {
        let filters = map(json!({"timestamp_after": "2026-01-01T00:00:00Z"}));
        assert!(matches(
            &filters,
            &map(json!({"timestamp": "2026-01-01T00:00:01Z"}))
        ));
        assert!(!matches(
            &filters,
            &map(json!({"timestamp": "2026-01-01T00:00:00Z"}))
        ));
        assert!(!matches(
            &filters,
            &map(json!({"timestamp": "2025-12-31T23:59:59Z"}))
        ));
    }

    #[test]
    fn timestamp_before_is_strict() {
        let filters = map(json!({"timestamp_before": "2026-01-01T00:00:00Z"}));
        assert!(matches(
            &filters,
            &map(json!({"timestamp": "2025-12-31T23:59:59Z"}))
        ));
        assert!(!matches(
            &filters,
            &map(json!({"timestamp": "2026-01-01T00:00:00Z"}))
        ));
    }

    #[test]
    fn temporal_filter_fails_on_missing_or_bad_timestamps() {
        let filters = map(json!({"timestamp_after": "2026-01-01T00:00:00Z"}));
        assert!(!matches(&filters, &map(json!({"device": "camera0"}))));
        assert!(!matches(&filters, &map(json!({"timestamp": "yesterday"}))));

        let filters = map(json!({"timestamp_after": "not-a-time"}));
        assert!(!matches(
            &filters,
            &map(json!({"timestamp": "2026-01-01T00:00:00Z"}))
        ));
    }
}
