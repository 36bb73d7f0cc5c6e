// crates/toolgate-core/src/core/tool.rs
// ============================================================================
// Module: Tool Descriptor Types
// Description: Raw upstream tool descriptors and canonical catalog records.
// Purpose: Model untrusted input leniently and canonical output strictly.
// Dependencies: crate::core::identifiers, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`RawToolDescriptor`] accepts whatever an upstream server reports: every
//! field is optional and scalar fields are coerced to strings, so decoding a
//! JSON object never fails. [`CanonicalTool`] is the immutable catalog record;
//! its [`InputSchema`] always carries `type`, `properties`, and `required`, and
//! its annotations are always an object.
//!
//! Security posture: `url` may embed credentials. It is stored verbatim and
//! never parsed, dereferenced, or written to audit events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::ToolId;
use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Raw Descriptor
// ============================================================================

/// Producer-supplied tool descriptor prior to normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawToolDescriptor {
    /// Producer-assigned identifier (possibly empty, not globally unique).
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Producer's own tool identifier.
    #[serde(default, alias = "original_name", deserialize_with = "lenient_string")]
    pub original_name: String,
    /// Upstream locator; opaque and possibly credential-bearing.
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    /// Optional free-text description.
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub description: Option<String>,
    /// Arbitrary JSON reported as the input schema (`null` when absent).
    #[serde(default, alias = "input_schema")]
    pub input_schema: Value,
    /// Arbitrary JSON reported as tool annotations (`null` when absent).
    #[serde(default)]
    pub annotations: Value,
    /// Display name; not guaranteed unique or slug-safe.
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
}

impl RawToolDescriptor {
    /// Decodes a descriptor from an arbitrary JSON value.
    ///
    /// Objects decode field by field; any other JSON value yields a fully
    /// empty descriptor, which normalization then defaults.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_default()
    }
}

/// Deserializes a string field, coercing scalars and collapsing others to empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string).unwrap_or_default())
}

/// Deserializes an optional string field, coercing scalars.
fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

/// Renders string, number, and boolean JSON values as text.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// ============================================================================
// SECTION: Input Schema
// ============================================================================

/// Errors raised when a JSON value is not a canonical input schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaShapeError {
    /// The schema is not a JSON object.
    #[error("input schema must be a json object")]
    NotObject,
    /// The `type` keyword is missing or not `"object"`.
    #[error("input schema type must be \"object\"")]
    Type,
    /// The `properties` keyword is missing or not an object.
    #[error("input schema properties must be an object")]
    Properties,
    /// The `required` keyword is missing or not an array of unique strings.
    #[error("input schema required must be an array of unique strings")]
    Required,
}

/// Canonical tool input schema.
///
/// # Invariants
/// - Serializes as an object with `type: "object"`, a `properties` object, and
///   a `required` array of unique strings.
/// - Additional top-level keywords are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub struct InputSchema {
    /// Property definitions keyed by argument name.
    properties: Map<String, Value>,
    /// Required argument names in producer order.
    required: Vec<String>,
    /// Pass-through keywords other than `type`, `properties`, and `required`.
    extra: Map<String, Value>,
}

impl InputSchema {
    /// Returns the canonical empty schema `{type: "object", properties: {}, required: []}`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            properties: Map::new(),
            required: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Assembles a schema from already-repaired parts.
    pub(crate) fn from_parts(
        properties: Map<String, Value>,
        required: Vec<String>,
        mut extra: Map<String, Value>,
    ) -> Self {
        for key in CANONICAL_KEYS {
            extra.remove(key);
        }
        Self {
            properties,
            required,
            extra,
        }
    }

    /// Returns the property definitions.
    #[must_use]
    pub const fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Returns the required argument names in order.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Returns pass-through keywords.
    #[must_use]
    pub const fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Returns required names that have no matching property definition.
    #[must_use]
    pub fn dangling_required(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|key| !self.properties.contains_key(key.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Renders the schema as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        object.insert("type".to_string(), Value::String(OBJECT_TYPE.to_string()));
        object.insert("properties".to_string(), Value::Object(self.properties.clone()));
        object.insert(
            "required".to_string(),
            Value::Array(self.required.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(object)
    }
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for InputSchema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl TryFrom<Value> for InputSchema {
    type Error = SchemaShapeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut object) = value else {
            return Err(SchemaShapeError::NotObject);
        };
        match object.remove("type") {
            Some(Value::String(kind)) if kind == OBJECT_TYPE => {}
            _ => return Err(SchemaShapeError::Type),
        }
        let Some(Value::Object(properties)) = object.remove("properties") else {
            return Err(SchemaShapeError::Properties);
        };
        let Some(Value::Array(entries)) = object.remove("required") else {
            return Err(SchemaShapeError::Required);
        };
        let mut required: Vec<String> = Vec::with_capacity(entries.len());
        for entry in entries {
            let Value::String(key) = entry else {
                return Err(SchemaShapeError::Required);
            };
            if required.contains(&key) {
                return Err(SchemaShapeError::Required);
            }
            required.push(key);
        }
        Ok(Self {
            properties,
            required,
            extra: object,
        })
    }
}

/// JSON Schema type every tool input schema is coerced to.
pub(crate) const OBJECT_TYPE: &str = "object";
/// Keywords owned by [`InputSchema`] rather than passed through.
const CANONICAL_KEYS: [&str; 3] = ["type", "properties", "required"];

// ============================================================================
// SECTION: Canonical Tool
// ============================================================================

/// Inputs required to construct a [`CanonicalTool`].
pub struct CanonicalToolParams {
    /// Catalog-unique identifier.
    pub id: ToolId,
    /// Catalog-unique slug.
    pub name: ToolName,
    /// Producer's original tool name.
    pub original_name: String,
    /// Opaque upstream locator.
    pub url: String,
    /// Description (empty when the producer omitted one).
    pub description: String,
    /// Canonical input schema.
    pub input_schema: InputSchema,
    /// Annotations object.
    pub annotations: Map<String, Value>,
}

/// Canonical catalog record for a single upstream tool.
///
/// # Invariants
/// - `input_schema` and `annotations` are never null.
/// - Records are immutable; updates replace the record with the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTool {
    /// Catalog-unique identifier.
    id: ToolId,
    /// Catalog-unique slug.
    name: ToolName,
    /// Producer's original tool name.
    original_name: String,
    /// Opaque upstream locator.
    url: String,
    /// Description (possibly empty).
    description: String,
    /// Canonical input schema.
    input_schema: InputSchema,
    /// Annotations object (possibly empty).
    annotations: Map<String, Value>,
}

impl CanonicalTool {
    /// Creates a canonical tool from validated parts.
    #[must_use]
    pub fn new(params: CanonicalToolParams) -> Self {
        Self {
            id: params.id,
            name: params.name,
            original_name: params.original_name,
            url: params.url,
            description: params.description,
            input_schema: params.input_schema,
            annotations: params.annotations,
        }
    }

    /// Returns the tool identifier.
    #[must_use]
    pub const fn id(&self) -> &ToolId {
        &self.id
    }

    /// Returns the canonical tool name.
    #[must_use]
    pub const fn name(&self) -> &ToolName {
        &self.name
    }

    /// Returns the producer's original tool name.
    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Returns the opaque upstream locator.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the canonical input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &InputSchema {
        &self.input_schema
    }

    /// Returns the annotations object.
    #[must_use]
    pub const fn annotations(&self) -> &Map<String, Value> {
        &self.annotations
    }
}
