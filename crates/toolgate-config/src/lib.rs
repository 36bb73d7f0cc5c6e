// crates/toolgate-config/src/lib.rs
// ============================================================================
// Module: Toolgate Config Library
// Description: Configuration model and validation for toolgate.toml.
// Purpose: Single source of truth for Toolgate configuration semantics.
// Dependencies: toolgate-core, toolgate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `toolgate-config` defines the configuration model shared by the CLI and
//! embedders: database connection, migration script output, ingestion
//! tunables, and audit sink selection. Validation is strict and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
