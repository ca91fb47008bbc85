//! Structural contracts for model responses
//!
//! A `Schema` describes the shape a parsed JSON value must have: field names,
//! value types, enum membership and numeric ranges. Validation stops at the
//! first violation and reports its path (e.g. `anomalies[0].severity`).

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Shape of a JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String,
    Number { min: Option<f64>, max: Option<f64> },
    /// A string that must be one of the listed values
    Enum(&'static [&'static str]),
    Array(Box<Schema>),
    /// Object with arbitrary string keys, every value matching the inner schema
    Record(Box<Schema>),
    /// Object with required named fields (unknown fields are ignored)
    Object(Vec<(&'static str, Schema)>),
}

impl Schema {
    pub fn string() -> Self {
        Schema::String
    }

    pub fn number() -> Self {
        Schema::Number {
            min: None,
            max: None,
        }
    }

    /// Number constrained to `min..=max`
    pub fn number_in(min: f64, max: f64) -> Self {
        Schema::Number {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn one_of(values: &'static [&'static str]) -> Self {
        Schema::Enum(values)
    }

    pub fn array_of(item: Schema) -> Self {
        Schema::Array(Box::new(item))
    }

    pub fn record_of(value: Schema) -> Self {
        Schema::Record(Box::new(value))
    }

    pub fn object(fields: Vec<(&'static str, Schema)>) -> Self {
        Schema::Object(fields)
    }

    /// Check `value` against this schema
    pub fn validate(&self, value: &Value) -> std::result::Result<(), SchemaViolation> {
        self.validate_at(value, "")
    }

    fn validate_at(&self, value: &Value, path: &str) -> std::result::Result<(), SchemaViolation> {
        match self {
            Schema::String => match value {
                Value::String(_) => Ok(()),
                other => Err(SchemaViolation::type_mismatch(path, "string", other)),
            },
            Schema::Number { min, max } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| SchemaViolation::type_mismatch(path, "number", value))?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(SchemaViolation::new(
                            path,
                            format!("{} is less than minimum {}", n, min),
                        ));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(SchemaViolation::new(
                            path,
                            format!("{} is greater than maximum {}", n, max),
                        ));
                    }
                }
                Ok(())
            }
            Schema::Enum(allowed) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| SchemaViolation::type_mismatch(path, "string", value))?;
                if allowed.contains(&s) {
                    Ok(())
                } else {
                    Err(SchemaViolation::new(
                        path,
                        format!("'{}' is not one of [{}]", s, allowed.join(", ")),
                    ))
                }
            }
            Schema::Array(item) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| SchemaViolation::type_mismatch(path, "array", value))?;
                for (i, v) in items.iter().enumerate() {
                    item.validate_at(v, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            Schema::Record(inner) => {
                let map = value
                    .as_object()
                    .ok_or_else(|| SchemaViolation::type_mismatch(path, "object", value))?;
                for (key, v) in map {
                    inner.validate_at(v, &join_path(path, key))?;
                }
                Ok(())
            }
            Schema::Object(fields) => {
                let map = value
                    .as_object()
                    .ok_or_else(|| SchemaViolation::type_mismatch(path, "object", value))?;
                for (name, field_schema) in fields {
                    let field_path = join_path(path, name);
                    match map.get(*name) {
                        Some(v) => field_schema.validate_at(v, &field_path)?,
                        None => {
                            return Err(SchemaViolation::new(&field_path, "required field missing"))
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// First place a value departs from its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Path to the offending field; empty for the root value
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }

    fn type_mismatch(path: &str, expected: &str, found: &Value) -> Self {
        Self::new(
            path,
            format!("expected {}, found {}", expected, json_type_name(found)),
        )
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A typed model response with a declared structural contract
pub trait StructuredResponse: DeserializeOwned {
    fn schema() -> Schema;
}
