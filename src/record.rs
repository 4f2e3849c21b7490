//! Records flowing through the pipeline and their fingerprints.
//!
//! A [`Record`] is an opaque, ordered map of field names to JSON values.
//! The engine never looks inside a record except to derive a
//! [`Fingerprint`], the key used for checkpointing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field name used by line-oriented sources.
pub const LINE_FIELD: &str = "line";

/// Default field consulted for a record's identity.
pub const DEFAULT_IDENTITY_FIELD: &str = "id";

/// An ordered mapping of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Create a single-field record holding one line of text.
    pub fn from_line(line: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.insert(LINE_FIELD, Value::String(line.into()));
        record
    }

    /// Build a record from a JSON value.
    ///
    /// Objects map field-for-field; any other value is wrapped as `{"value": v}`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map.into_iter().collect()),
            other => {
                let mut record = Self::new();
                record.insert("value", other);
                record
            }
        }
    }

    /// The text of a line record, if this is one.
    pub fn line(&self) -> Option<&str> {
        self.0.get(LINE_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute this record's fingerprint.
    ///
    /// Uses the identity field when present, otherwise a blake3 digest of the
    /// record's canonical JSON form (keys sorted at every level), so field
    /// order does not change the result.
    pub fn fingerprint(&self, identity_field: &str) -> Fingerprint {
        if let Some(id) = self.0.get(identity_field) {
            return Fingerprint(format!("{identity_field}:{}", scalar_text(id)));
        }

        let canonical: BTreeMap<&str, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.as_str(), canonical(v)))
            .collect();
        // Serializing a map of JSON values cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        Fingerprint(blake3::hash(&bytes).to_hex().to_string())
    }
}

/// Copy of `value` with object keys sorted at every depth.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Render a JSON value as plain text: strings without quotes, everything
/// else as compact JSON.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stable identity key of a record, used for checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_field_wins() {
        let record = Record::from_value(json!({"id": 42, "text": "hello"}));
        assert_eq!(record.fingerprint("id").as_str(), "id:42");

        let record = Record::from_value(json!({"id": "abc"}));
        assert_eq!(record.fingerprint("id").as_str(), "id:abc");
    }

    #[test]
    fn test_fingerprint_ignores_field_order() {
        let a = Record::from_value(json!({"a": 1, "b": "two"}));
        let mut b = Record::new();
        b.insert("b", json!("two"));
        b.insert("a", json!(1));

        assert_eq!(a.fingerprint("id"), b.fingerprint("id"));
    }

    #[test]
    fn test_fingerprint_ignores_nested_field_order() {
        let a = Record::from_value(json!({"outer": {"x": 1, "y": [{"p": 1, "q": 2}]}}));
        let b = Record::from_value(json!({"outer": {"y": [{"q": 2, "p": 1}], "x": 1}}));
        assert_eq!(a.fingerprint("id"), b.fingerprint("id"));
    }

    #[test]
    fn test_fingerprint_distinguishes_content() {
        let a = Record::from_line("a");
        let b = Record::from_line("b");
        assert_ne!(a.fingerprint("id"), b.fingerprint("id"));
        assert_eq!(a.fingerprint("id"), Record::from_line("a").fingerprint("id"));
    }

    #[test]
    fn test_non_object_values_are_wrapped() {
        let record = Record::from_value(json!([1, 2]));
        assert_eq!(record.get("value"), Some(&json!([1, 2])));
        assert_eq!(record.line(), None);
    }

    #[test]
    fn test_display_is_json() {
        let record = Record::from_line("x");
        assert_eq!(record.to_string(), r#"{"line":"x"}"#);
    }
}
