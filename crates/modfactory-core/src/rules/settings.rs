//! Accumulated rule settings.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Settings contributed by matching rules, keyed by setting name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, Value>,
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one setting in.
    ///
    /// When the accumulated value and `value` are both objects they are
    /// merged, `value` winning on conflicting keys. Any other combination
    /// (object onto scalar, scalar onto object, scalar onto scalar) replaces
    /// the old value outright.
    pub fn apply(&mut self, key: &str, value: Value) {
        if let Value::Object(incoming) = value {
            if let Some(Value::Object(existing)) = self.values.get_mut(key) {
                merge_objects(existing, incoming);
                return;
            }
            self.values.insert(key.to_string(), Value::Object(incoming));
        } else {
            self.values.insert(key.to_string(), value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A setting that must be a string (e.g. `type`).
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Right-biased deep merge of `incoming` into `target`.
pub fn merge_objects(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if let Value::Object(nested) = value {
            if let Some(Value::Object(existing)) = target.get_mut(&key) {
                merge_objects(existing, nested);
                continue;
            }
            target.insert(key, Value::Object(nested));
        } else {
            target.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_objects_merge() {
        let mut settings = Settings::new();
        settings.apply("parser", json!({"a": 1}));
        settings.apply("parser", json!({"b": 2}));
        assert_eq!(settings.get("parser"), Some(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_scalar_replaces_object() {
        let mut settings = Settings::new();
        settings.apply("parser", json!({"a": 1}));
        settings.apply("parser", json!(42));
        assert_eq!(settings.get("parser"), Some(&json!(42)));
    }

    #[test]
    fn test_object_replaces_scalar() {
        let mut settings = Settings::new();
        settings.apply("parser", json!("plain"));
        settings.apply("parser", json!({"a": 1}));
        assert_eq!(settings.get("parser"), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_merge_is_deep_and_right_biased() {
        let mut settings = Settings::new();
        settings.apply("resolve", json!({"alias": {"a": "/x"}, "mainFields": ["main"]}));
        settings.apply("resolve", json!({"alias": {"b": "/y"}, "mainFields": ["module"]}));
        assert_eq!(
            settings.get("resolve"),
            Some(&json!({"alias": {"a": "/x", "b": "/y"}, "mainFields": ["module"]}))
        );
    }

    #[test]
    fn test_get_str() {
        let mut settings = Settings::new();
        settings.apply("type", json!("json"));
        settings.apply("sideEffects", json!(false));
        assert_eq!(settings.get_str("type"), Some("json"));
        assert_eq!(settings.get_str("sideEffects"), None);
    }
}
