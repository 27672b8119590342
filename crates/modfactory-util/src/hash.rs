use serde_json::{Map, Value};

/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Serialize a JSON value to its canonical string form.
///
/// Object keys are emitted in sorted order at every depth, so two
/// structurally equal values serialize to the same bytes regardless of how
/// they were built or whether `serde_json` preserves insertion order.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    // Serializing a `Value` cannot fail: every key is already a string.
    serde_json::to_string(&sorted(value)).unwrap_or_default()
}

/// Copy of `value` whose object keys are inserted in sorted order.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sorted(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Content digest of a JSON value: BLAKE3 over its canonical serialization.
#[must_use]
pub fn json_digest(value: &Value) -> String {
    blake3_bytes(canonical_json(value).as_bytes())
}
