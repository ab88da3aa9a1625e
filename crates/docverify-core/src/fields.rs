//! The fixed-shape field record produced by structured extraction.
//!
//! Extraction output is untrusted JSON. It is checked once here, at the
//! boundary, against an embedded JSON Schema; everything downstream only
//! ever asks "present or absent".

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Embedded schema for raw extraction output.
const FIELD_SET_SCHEMA_JSON: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "Extracted identity-document fields",
  "type": "object",
  "properties": {
    "name":           { "type": ["string", "number", "boolean", "null"] },
    "date_of_birth":  { "type": ["string", "number", "boolean", "null"] },
    "address":        { "type": ["string", "number", "boolean", "null"] },
    "id_number":      { "type": ["string", "number", "boolean", "null"] },
    "aadhaar_number": { "type": ["string", "number", "boolean", "null"] },
    "pan_number":     { "type": ["string", "number", "boolean", "null"] },
    "gender":         { "type": ["string", "number", "boolean", "null"] },
    "father_name":    { "type": ["string", "number", "boolean", "null"] }
  }
}"#;

/// Compiled schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors raised while accepting extraction output.
#[derive(Error, Debug)]
pub enum FieldSetError {
    #[error("Extraction output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Extraction output failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Failed to load field schema: {0}")]
    SchemaLoad(String),
}

/// One of the eight recognized field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Name,
    DateOfBirth,
    Address,
    IdNumber,
    AadhaarNumber,
    PanNumber,
    Gender,
    FatherName,
}

impl FieldName {
    /// All recognized fields, in wire order.
    pub const ALL: [FieldName; 8] = [
        FieldName::Name,
        FieldName::DateOfBirth,
        FieldName::Address,
        FieldName::IdNumber,
        FieldName::AadhaarNumber,
        FieldName::PanNumber,
        FieldName::Gender,
        FieldName::FatherName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Name => "name",
            FieldName::DateOfBirth => "date_of_birth",
            FieldName::Address => "address",
            FieldName::IdNumber => "id_number",
            FieldName::AadhaarNumber => "aadhaar_number",
            FieldName::PanNumber => "pan_number",
            FieldName::Gender => "gender",
            FieldName::FatherName => "father_name",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown field '{}'", s))
    }
}

/// Extracted fields for one document.
///
/// Every member is either absent or a non-empty, trimmed string. Values are
/// normalized on the way in, so `Some("")` can never be observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default, deserialize_with = "non_blank")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "non_blank")]
    pub date_of_birth: Option<String>,

    #[serde(default, deserialize_with = "non_blank")]
    pub address: Option<String>,

    #[serde(default, deserialize_with = "non_blank")]
    pub id_number: Option<String>,

    #[serde(default, deserialize_with = "non_blank")]
    pub aadhaar_number: Option<String>,

    #[serde(default, deserialize_with = "non_blank")]
    pub pan_number: Option<String>,

    #[serde(default, deserialize_with = "non_blank")]
    pub gender: Option<String>,

    #[serde(default, deserialize_with = "non_blank")]
    pub father_name: Option<String>,
}

impl FieldSet {
    /// A record with every field absent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set a field, normalizing blank values to absent.
    pub fn with(mut self, field: FieldName, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    /// Set or clear a field, normalizing blank values to absent.
    pub fn set(&mut self, field: FieldName, value: Option<String>) {
        let value = normalize(value);
        match field {
            FieldName::Name => self.name = value,
            FieldName::DateOfBirth => self.date_of_birth = value,
            FieldName::Address => self.address = value,
            FieldName::IdNumber => self.id_number = value,
            FieldName::AadhaarNumber => self.aadhaar_number = value,
            FieldName::PanNumber => self.pan_number = value,
            FieldName::Gender => self.gender = value,
            FieldName::FatherName => self.father_name = value,
        }
    }

    /// Get a field value if present.
    pub fn get(&self, field: FieldName) -> Option<&str> {
        match field {
            FieldName::Name => self.name.as_deref(),
            FieldName::DateOfBirth => self.date_of_birth.as_deref(),
            FieldName::Address => self.address.as_deref(),
            FieldName::IdNumber => self.id_number.as_deref(),
            FieldName::AadhaarNumber => self.aadhaar_number.as_deref(),
            FieldName::PanNumber => self.pan_number.as_deref(),
            FieldName::Gender => self.gender.as_deref(),
            FieldName::FatherName => self.father_name.as_deref(),
        }
    }

    /// Whether a field is present.
    pub fn has(&self, field: FieldName) -> bool {
        self.get(field).is_some()
    }

    /// True when no field is present.
    pub fn is_empty(&self) -> bool {
        FieldName::ALL.iter().all(|f| !self.has(*f))
    }

    /// Number of present fields.
    pub fn present_count(&self) -> usize {
        FieldName::ALL.iter().filter(|f| self.has(**f)).count()
    }

    /// Accept raw extraction output.
    ///
    /// The value must be a JSON object whose recognized keys hold scalars or
    /// null. Unrecognized keys are ignored; numbers and booleans are
    /// stringified; blank strings become absent.
    pub fn from_json_value(value: &JsonValue) -> Result<Self, FieldSetError> {
        validate_schema(value)?;

        let mut fields = FieldSet::empty();
        for name in FieldName::ALL {
            let raw = match &value[name.as_str()] {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                JsonValue::Bool(b) => Some(b.to_string()),
                _ => None,
            };
            fields.set(name, raw);
        }
        Ok(fields)
    }

    /// Accept raw extraction output given as a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, FieldSetError> {
        let value: JsonValue = serde_json::from_str(raw)?;
        Self::from_json_value(&value)
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(normalize(value))
}

fn get_validator() -> Result<&'static jsonschema::Validator, FieldSetError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: JsonValue = match serde_json::from_str(FIELD_SET_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(FieldSetError::SchemaLoad(e.clone())),
    }
}

fn validate_schema(value: &JsonValue) -> Result<(), FieldSetError> {
    let validator = get_validator()?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(FieldSetError::Schema(errors))
    }
}
