// crates/toolgate-core/src/core/repair.rs
// ============================================================================
// Module: Schema Repair
// Description: Total defaulting of tool input schemas and annotations.
// Purpose: Convert arbitrary upstream JSON into the canonical schema shape.
// Dependencies: crate::core::tool, serde, serde_json
// ============================================================================

//! ## Overview
//! Repair functions are total over all JSON values: the worst case is the
//! canonical empty schema. Every change is recorded in a [`RepairLog`] so that
//! upstream defects stay auditable even though they never block ingestion.
//!
//! Unknown JSON Schema keywords (`additionalProperties`, `$defs`, nested
//! property schemas, ...) are passed through untouched. Only the three
//! canonical keywords `type`, `properties`, and `required` are rewritten.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::tool::InputSchema;
use crate::core::tool::OBJECT_TYPE;

// ============================================================================
// SECTION: Repair Log
// ============================================================================

/// Kind of repair or canonicalization applied to a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairKind {
    /// Input schema was null or not an object and was replaced entirely.
    Defaulted,
    /// Missing `type` was set to `"object"`.
    FilledType,
    /// Missing `properties` was set to `{}`.
    FilledProperties,
    /// Missing `required` was set to `[]`.
    FilledRequired,
    /// A `required` entry has no matching property (kept).
    DanglingRequired,
    /// `type` was present with a value other than `"object"`.
    CoercedType,
    /// `properties` was present but not an object.
    CoercedProperties,
    /// `required` was present but not an array.
    CoercedRequired,
    /// A non-string `required` entry was dropped.
    DroppedRequiredEntry,
    /// A duplicate `required` entry was dropped.
    DeduplicatedRequired,
    /// Annotations were null or not an object and were replaced with `{}`.
    DefaultedAnnotations,
    /// Producer identifier was empty, oversized, or reserved; a fresh one was issued.
    RegeneratedId,
    /// Display name was rewritten into slug form.
    SlugifiedName,
    /// Slug collided with an existing name and received a suffix.
    DisambiguatedName,
}

impl RepairKind {
    /// Returns the severity of the repair.
    #[must_use]
    pub const fn severity(self) -> RepairSeverity {
        match self {
            Self::DanglingRequired
            | Self::CoercedType
            | Self::CoercedProperties
            | Self::CoercedRequired
            | Self::DroppedRequiredEntry => RepairSeverity::Warning,
            Self::Defaulted
            | Self::FilledType
            | Self::FilledProperties
            | Self::FilledRequired
            | Self::DeduplicatedRequired
            | Self::DefaultedAnnotations
            | Self::RegeneratedId
            | Self::SlugifiedName
            | Self::DisambiguatedName => RepairSeverity::Info,
        }
    }
}

/// Severity classification for repair events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairSeverity {
    /// Routine defaulting.
    Info,
    /// Upstream intent may be incomplete; surfaced for operators.
    Warning,
}

/// A single repair applied during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairEvent {
    /// Repair kind.
    pub kind: RepairKind,
    /// Severity derived from the kind.
    pub severity: RepairSeverity,
    /// Descriptor field the repair applies to.
    pub field: &'static str,
    /// Optional detail (offending key or JSON kind); never a raw payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Ordered log of repairs applied to one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RepairLog {
    /// Events in the order they were applied.
    events: Vec<RepairEvent>,
}

impl RepairLog {
    /// Creates an empty repair log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    /// Records a repair event.
    pub fn record(&mut self, kind: RepairKind, field: &'static str, detail: Option<String>) {
        self.events.push(RepairEvent {
            kind,
            severity: kind.severity(),
            field,
            detail,
        });
    }

    /// Appends all events from another log.
    pub fn extend(&mut self, other: Self) {
        self.events.extend(other.events);
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[RepairEvent] {
        &self.events
    }

    /// Returns true when no repairs were applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns true when any event has warning severity.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.events.iter().any(|event| event.severity == RepairSeverity::Warning)
    }

    /// Returns true when an event of the given kind was recorded.
    #[must_use]
    pub fn contains(&self, kind: RepairKind) -> bool {
        self.events.iter().any(|event| event.kind == kind)
    }
}

// ============================================================================
// SECTION: Repair Functions
// ============================================================================

/// Field label used for input schema repairs.
const INPUT_SCHEMA_FIELD: &str = "inputSchema";
/// Field label used for annotation repairs.
const ANNOTATIONS_FIELD: &str = "annotations";

/// Repairs an arbitrary JSON value into a canonical input schema.
///
/// Never fails: `null` and non-object values produce the canonical empty
/// schema, and each missing or malformed canonical keyword is defaulted.
#[must_use]
pub fn repair_input_schema(raw: &Value) -> (InputSchema, RepairLog) {
    let mut log = RepairLog::new();
    let Value::Object(object) = raw else {
        log.record(RepairKind::Defaulted, INPUT_SCHEMA_FIELD, Some(json_kind(raw).to_string()));
        return (InputSchema::empty(), log);
    };
    let mut extra = object.clone();

    match extra.remove("type") {
        None => log.record(RepairKind::FilledType, INPUT_SCHEMA_FIELD, None),
        Some(Value::String(kind)) if kind == OBJECT_TYPE => {}
        Some(other) => {
            log.record(RepairKind::CoercedType, INPUT_SCHEMA_FIELD, Some(describe_type(&other)));
        }
    }

    let properties = match extra.remove("properties") {
        None => {
            log.record(RepairKind::FilledProperties, INPUT_SCHEMA_FIELD, None);
            Map::new()
        }
        Some(Value::Object(properties)) => properties,
        Some(other) => {
            let detail = Some(json_kind(&other).to_string());
            log.record(RepairKind::CoercedProperties, INPUT_SCHEMA_FIELD, detail);
            Map::new()
        }
    };

    let required = match extra.remove("required") {
        None => {
            log.record(RepairKind::FilledRequired, INPUT_SCHEMA_FIELD, None);
            Vec::new()
        }
        Some(Value::Array(entries)) => repair_required_entries(entries, &mut log),
        Some(other) => {
            let detail = Some(json_kind(&other).to_string());
            log.record(RepairKind::CoercedRequired, INPUT_SCHEMA_FIELD, detail);
            Vec::new()
        }
    };

    let schema = InputSchema::from_parts(properties, required, extra);
    for key in schema.dangling_required() {
        log.record(RepairKind::DanglingRequired, INPUT_SCHEMA_FIELD, Some(key.to_string()));
    }
    if log.has_warnings() {
        tracing::warn!(repairs = log.events().len(), "input schema repaired with warnings");
    }
    (schema, log)
}

/// Repairs an arbitrary JSON value into an annotations object.
///
/// `null` and non-object values become `{}`; objects pass through unchanged.
#[must_use]
pub fn repair_annotations(raw: &Value) -> (Map<String, Value>, RepairLog) {
    let mut log = RepairLog::new();
    match raw {
        Value::Object(object) => (object.clone(), log),
        other => {
            let detail = Some(json_kind(other).to_string());
            log.record(RepairKind::DefaultedAnnotations, ANNOTATIONS_FIELD, detail);
            (Map::new(), log)
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Keeps string entries of `required` in order, dropping non-strings and duplicates.
fn repair_required_entries(entries: Vec<Value>, log: &mut RepairLog) -> Vec<String> {
    let mut required: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::String(key) if required.contains(&key) => {
                log.record(RepairKind::DeduplicatedRequired, INPUT_SCHEMA_FIELD, Some(key));
            }
            Value::String(key) => required.push(key),
            other => {
                log.record(
                    RepairKind::DroppedRequiredEntry,
                    INPUT_SCHEMA_FIELD,
                    Some(json_kind(&other).to_string()),
                );
            }
        }
    }
    required
}

/// Describes a replaced `type` value without echoing large payloads.
fn describe_type(value: &Value) -> String {
    match value {
        Value::String(kind) => kind.clone(),
        other => json_kind(other).to_string(),
    }
}

/// Returns the JSON kind label for a value.
const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
