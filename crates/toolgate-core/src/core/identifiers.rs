// crates/toolgate-core/src/core/identifiers.rs
// ============================================================================
// Module: Toolgate Identifiers
// Description: Canonical identifiers for catalog tools.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Tool identifiers are opaque strings that serialize transparently. As with
//! other boundary types, the wrappers do not validate on construction; the
//! normalizer produces canonical values and storage backends check
//! [`ToolName::is_canonical`] when reading untrusted rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted length of a producer-supplied tool identifier (bytes).
pub const MAX_TOOL_ID_LENGTH: usize = 256;
/// Maximum length of a canonical tool name including any suffix (bytes).
pub const MAX_TOOL_NAME_LENGTH: usize = 256;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Catalog-unique tool identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolId(String);

impl ToolId {
    /// Creates a new tool identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identifier (UUID v4 rendered as 32 lowercase hex digits).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ToolId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ToolId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Catalog-unique tool name (slug).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolName(String);

impl ToolName {
    /// Creates a new tool name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the name is a canonical slug.
    ///
    /// Canonical slugs are non-empty, lowercase ASCII alphanumerics separated
    /// by single `-` characters, with no leading or trailing separator.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        let value = self.0.as_str();
        if value.is_empty() || value.len() > MAX_TOOL_NAME_LENGTH {
            return false;
        }
        if value.starts_with('-') || value.ends_with('-') || value.contains("--") {
            return false;
        }
        value.bytes().all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-')
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ToolName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ToolName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
