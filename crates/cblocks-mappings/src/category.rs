//! Category mapping: labels discrete resource values.
//!
//! Entries are scanned in order and the first structurally equal value
//! wins. Values that match no entry map to the default label.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cblocks_core::error::{Error, Result};
use cblocks_core::mapping::MappingStrategy;
use cblocks_core::resource::Resource;

/// One `value -> label` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub value: Value,
    pub label: String,
}

impl CategoryLabel {
    pub fn new(value: Value, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub default: String,
    pub labels: Vec<CategoryLabel>,
}

impl CategoryMapping {
    pub fn new(default: impl Into<String>, labels: Vec<CategoryLabel>) -> Self {
        Self {
            default: default.into(),
            labels,
        }
    }

    /// Label for `value`, or the default when nothing matches.
    pub fn label_for(&self, value: &Value) -> &str {
        self.labels
            .iter()
            .find(|entry| values_equal(&entry.value, value))
            .map(|entry| entry.label.as_str())
            .unwrap_or(self.default.as_str())
    }
}

impl MappingStrategy for CategoryMapping {
    const KIND: &'static str = "category";

    fn apply(&self, value: &Value) -> Result<Value> {
        Ok(Value::String(self.label_for(value).to_string()))
    }

    /// Every listed value must be a value the resource can take.
    fn is_applicable_for(&self, resource: &Resource) -> bool {
        self.labels
            .iter()
            .all(|entry| resource.schema.validate(&entry.value).is_ok())
    }

    fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(Error::Validation(
                "Category mapping needs at least one label".to_string(),
            ));
        }
        if self.labels.iter().any(|entry| entry.label.trim().is_empty()) {
            return Err(Error::Validation("Category labels must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Structural equality; numbers compare by value so `20` equals `20.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
