//! Declarative field schemas and the fail-fast validator.
//!
//! A [`Schema`] maps field names to constraint descriptors (required flag,
//! expected primitive kind). Validation never mutates the record it checks
//! and reports only the first violated constraint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Expected primitive kind for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }

    /// Whether `value` satisfies this kind.
    ///
    /// Records built from headers, params and query strings carry every value
    /// as a string, so number/boolean accept strings that parse as such.
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => {
                value.is_number()
                    || value
                        .as_str()
                        .is_some_and(|s| s.parse::<f64>().is_ok())
            }
            FieldKind::Boolean => {
                value.is_boolean()
                    || value
                        .as_str()
                        .is_some_and(|s| s == "true" || s == "false")
            }
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }

    fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Constraint descriptor for a single field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRule {
    /// The field must be present in the record.
    #[serde(default)]
    pub required: bool,
    /// Expected kind, checked only when the field is present.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
}

impl FieldRule {
    pub fn required(kind: FieldKind) -> Self {
        Self {
            required: true,
            kind: Some(kind),
        }
    }

    pub fn optional(kind: FieldKind) -> Self {
        Self {
            required: false,
            kind: Some(kind),
        }
    }
}

/// A mapping from field name to constraint descriptor.
///
/// Schemas are loaded once at handler-registration time and never change
/// afterwards. Field order is deterministic (sorted by name), which makes
/// the "first violated constraint" in error messages stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field rule, builder style.
    pub fn field(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.insert(name.to_string(), rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate a keyed record against this schema.
    ///
    /// Fails with `VALIDATION_ERROR` on the first violated constraint: a
    /// missing required field, or a present field whose value does not match
    /// the declared kind. The record is never mutated. A non-object record
    /// is treated as an empty record.
    pub fn validate(&self, record: &Value) -> Result<(), Error> {
        let empty = serde_json::Map::new();
        let map = record.as_object().unwrap_or(&empty);
        for (name, rule) in &self.fields {
            match map.get(name) {
                None => {
                    if rule.required {
                        return Err(Error::validation(format!(
                            "missing required field `{name}`"
                        )));
                    }
                }
                Some(value) => {
                    if let Some(kind) = rule.kind {
                        if !kind.matches(value) {
                            return Err(Error::validation(format!(
                                "field `{name}` expected {}, got {}",
                                kind.name(),
                                FieldKind::describe(value)
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// The per-route bundle of validation schemas.
///
/// Each member validates one section of the request; absent members mean
/// that section is accepted as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSchemas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub querystring: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Schema>,
}

/// Build a JSON record from string key/value pairs, for header/param/query
/// validation.
pub fn record_from_pairs<'a, I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let map: serde_json::Map<String, Value> = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    Value::Object(map)
}
