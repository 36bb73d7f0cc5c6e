// crates/toolgate-core/src/core/mod.rs
// ============================================================================
// Module: Toolgate Core Types
// Description: Tool descriptor model, identifiers, schema repair, and hashing.
// Purpose: Provide stable, serializable types for the canonical tool catalog.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define the untrusted [`RawToolDescriptor`] received from
//! upstream servers and the canonical [`CanonicalTool`] record stored in the
//! catalog, together with the total repair functions that bridge them.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod hashing;
pub mod identifiers;
pub mod repair;
pub mod tool;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::MAX_TOOL_ID_LENGTH;
pub use identifiers::MAX_TOOL_NAME_LENGTH;
pub use identifiers::ToolId;
pub use identifiers::ToolName;
pub use repair::RepairEvent;
pub use repair::RepairKind;
pub use repair::RepairLog;
pub use repair::RepairSeverity;
pub use repair::repair_annotations;
pub use repair::repair_input_schema;
pub use tool::CanonicalTool;
pub use tool::CanonicalToolParams;
pub use tool::InputSchema;
pub use tool::RawToolDescriptor;
pub use tool::SchemaShapeError;
