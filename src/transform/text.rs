//! Text-oriented transformers.

use async_trait::async_trait;
use serde_json::Value;

use super::Transformer;
use crate::error::{MalformedSnafu, TransformError};
use crate::record::Record;

/// Uppercases every string value, including those nested in arrays and
/// objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseTransformer;

fn uppercase(value: &mut Value) {
    match value {
        Value::String(s) => *s = s.to_uppercase(),
        Value::Array(items) => items.iter_mut().for_each(uppercase),
        Value::Object(map) => map.values_mut().for_each(uppercase),
        _ => {}
    }
}

#[async_trait]
impl Transformer for UppercaseTransformer {
    fn name(&self) -> &str {
        "uppercase"
    }

    async fn apply(&self, mut record: Record) -> Result<Option<Record>, TransformError> {
        record.values_mut().for_each(uppercase);
        Ok(Some(record))
    }
}

/// Splits a delimited text field into named fields.
///
/// The source field is replaced by the named fields. The last name
/// receives the unsplit remainder when there are more parts than names.
#[derive(Debug, Clone)]
pub struct SplitFieldsTransformer {
    source_field: String,
    delimiter: String,
    fields: Vec<String>,
}

impl SplitFieldsTransformer {
    pub fn new(source_field: String, delimiter: String, fields: Vec<String>) -> Self {
        Self {
            source_field,
            delimiter,
            fields,
        }
    }

    fn malformed(&self, message: String) -> TransformError {
        MalformedSnafu {
            stage: self.name(),
            message,
        }
        .build()
    }
}

#[async_trait]
impl Transformer for SplitFieldsTransformer {
    fn name(&self) -> &str {
        "split_fields"
    }

    async fn apply(&self, mut record: Record) -> Result<Option<Record>, TransformError> {
        let text = match record.get(&self.source_field) {
            Some(Value::String(text)) => text.clone(),
            Some(_) => {
                return Err(self.malformed(format!("field '{}' is not text", self.source_field)));
            }
            None => {
                return Err(self.malformed(format!("field '{}' is missing", self.source_field)));
            }
        };

        let parts: Vec<&str> = text.splitn(self.fields.len(), self.delimiter.as_str()).collect();
        if parts.len() < self.fields.len() {
            return Err(self.malformed(format!(
                "expected {} values, found {}",
                self.fields.len(),
                parts.len()
            )));
        }

        record.remove(&self.source_field);
        for (name, part) in self.fields.iter().zip(parts) {
            record.insert(name.clone(), Value::String(part.to_string()));
        }
        Ok(Some(record))
    }
}
