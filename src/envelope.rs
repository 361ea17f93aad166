//! Wraps a caller payload with host identity fields and serializes it to
//! the JSON body the collection server expects (§4.4, §6).

use serde_json::{Map, Value as JsonValue};

use crate::types::Payload;

/// Build `{ <form_param_name>: { ...payload, "fingerprint": ..., "machine": ... } }`
/// and serialize it to a UTF-8 JSON string.
pub fn build_envelope(
    payload: &Payload,
    fingerprint: &str,
    machine_id: i64,
    form_param_name: &str,
) -> String {
    let mut inner = Map::new();
    for (key, value) in payload {
        inner.insert(key.clone(), serde_json::to_value(value).expect("MetricValue always serializes"));
    }
    inner.insert("fingerprint".to_string(), JsonValue::String(fingerprint.to_string()));
    inner.insert("machine".to_string(), JsonValue::from(machine_id));

    let mut outer = Map::new();
    outer.insert(form_param_name.to_string(), JsonValue::Object(inner));

    serde_json::to_string(&JsonValue::Object(outer)).expect("envelope always serializes")
}
