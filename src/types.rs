//! Shared data types: the tagged value model callers build payloads from,
//! the payload alias, and the cache capacity state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tagged scalar or nested value a caller may put in a [`Payload`].
///
/// Mirrors the small set of scalar kinds the wire format supports: signed
/// 64-bit integers, doubles, strings, booleans, and arrays of the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int64(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Array(Vec<MetricValue>),
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int64(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Double(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Str(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Str(v.to_string())
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

/// Caller-supplied mapping from string key to [`MetricValue`]. Opaque to the
/// rest of the system beyond serialization; a `BTreeMap` gives deterministic
/// key ordering, which keeps envelope bodies reproducible in tests.
pub type Payload = BTreeMap<String, MetricValue>;

/// How full the persistent cache is. `Max` is sticky: once hit, it is only
/// cleared by a purge (version mismatch) or a successful drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Low,
    High,
    Max,
}

impl Capacity {
    /// Recompute from a byte count against `max`, using `threshold` (the
    /// fraction of `max` at which `Low` becomes `High` —
    /// [`crate::config::HIGH_CAPACITY_THRESHOLD`] in production). Never
    /// downgrades out of `Max` — callers that want to clear `Max` do so
    /// explicitly on purge/drain.
    pub fn from_size(current: Capacity, size: u64, max: u64, threshold: f64) -> Capacity {
        if current == Capacity::Max {
            return Capacity::Max;
        }
        if max == 0 || size as f64 >= threshold * max as f64 {
            Capacity::High
        } else {
            Capacity::Low
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn capacity_transitions_on_size() {
        assert_eq!(Capacity::from_size(Capacity::Low, 0, 100, 0.75), Capacity::Low);
        assert_eq!(Capacity::from_size(Capacity::Low, 74, 100, 0.75), Capacity::Low);
        assert_eq!(Capacity::from_size(Capacity::Low, 75, 100, 0.75), Capacity::High);
        assert_eq!(Capacity::from_size(Capacity::High, 80, 100, 0.75), Capacity::High);
    }

    #[test]
    fn capacity_max_is_sticky() {
        assert_eq!(Capacity::from_size(Capacity::Max, 0, 100, 0.75), Capacity::Max);
    }

    #[test]
    fn metric_value_conversions_roundtrip_through_json() {
        let v: MetricValue = 5i64.into();
        assert_eq!(serde_json::to_string(&v).unwrap(), "5");
        let v: MetricValue = "hi".into();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"hi\"");
    }
}
