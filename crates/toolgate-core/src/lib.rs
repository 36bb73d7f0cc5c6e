// crates/toolgate-core/src/lib.rs
// ============================================================================
// Module: Toolgate Core Library
// Description: Public API surface for the Toolgate catalog ingestion core.
// Purpose: Expose tool model types, repair/normalization, and store interfaces.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Toolgate core turns untrusted tool descriptors reported by upstream MCP
//! servers into canonical catalog records. Schema repair and normalization are
//! total: a malformed descriptor is defaulted and logged, never rejected.
//! Persistence is reached through the [`CatalogStore`] interface so that
//! storage backends remain pluggable.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::AuditOutcome;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::MigrationAuditEvent;
pub use audit::MigrationAuditEventParams;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::ToolIngestAuditEvent;
pub use interfaces::CatalogStore;
pub use interfaces::StoreError;
pub use runtime::CancelToken;
pub use runtime::CatalogIngestor;
pub use runtime::InMemoryCatalogStore;
pub use runtime::IngestError;
pub use runtime::IngestFailure;
pub use runtime::IngestOptions;
pub use runtime::IngestReport;
pub use runtime::NormalizedTool;
pub use runtime::NormalizerOptions;
pub use runtime::ToolNormalizer;
pub use runtime::normalize;
pub use runtime::parse_descriptors;
pub use runtime::slugify;
