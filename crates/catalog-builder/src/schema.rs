//! Validation of parsed records against a JSON schema document.
//!
//! Understands the subset of JSON Schema used by the asset schema: `type`
//! (a name or a list of names), `properties`, `required`, `items` and
//! `enum`. Other keywords are ignored.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{BuildError, Result};

/// Asset schema shipped with the builder.
pub const DEFAULT_ASSET_SCHEMA: &str = include_str!("../schemas/asset.schema.json");

#[derive(Debug, Clone)]
pub struct Schema {
    document: Value,
}

impl Schema {
    pub fn default_asset() -> Result<Self> {
        Self::from_str(DEFAULT_ASSET_SCHEMA)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_str(&raw)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(raw)?;
        if !document.is_object() {
            return Err(BuildError::InvalidConfig(
                "schema document must be a JSON object".to_string(),
            ));
        }
        Ok(Self { document })
    }

    /// All violations of `instance`, as human-readable messages. Empty
    /// when the instance conforms.
    pub fn validate(&self, instance: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        check(&self.document, instance, "$", &mut errors);
        errors
    }
}

fn check(schema: &Value, instance: &Value, at: &str, errors: &mut Vec<String>) {
    if let Some(expected) = schema.get("type") {
        let names: Vec<&str> = match expected {
            Value::String(name) => vec![name.as_str()],
            Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !names.is_empty() && !names.iter().any(|name| type_matches(name, instance)) {
            errors.push(format!(
                "{}: expected {}, found {}",
                at,
                names.join(" or "),
                type_name(instance)
            ));
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(instance) {
            errors.push(format!("{}: {} is not one of the allowed values", at, instance));
        }
    }

    if let Value::Object(map) = instance {
        if let Some(Value::Array(required)) = schema.get("required") {
            for field in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(field) {
                    errors.push(format!("{}: missing required field '{}'", at, field));
                }
            }
        }
        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (name, sub) in properties {
                if let Some(value) = map.get(name) {
                    check(sub, value, &format!("{}.{}", at, name), errors);
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (instance, schema.get("items")) {
        for (idx, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", at, idx), errors);
        }
    }
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
