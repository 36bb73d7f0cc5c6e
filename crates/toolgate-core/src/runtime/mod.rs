// crates/toolgate-core/src/runtime/mod.rs
// ============================================================================
// Module: Toolgate Runtime
// Description: Tool normalization, ingestion pipeline, and in-memory store.
// Purpose: Drive raw descriptors into a catalog store with bounded retries.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules turn [`crate::RawToolDescriptor`] values into stored
//! [`crate::CanonicalTool`] records. Normalization is pure; the ingestion
//! pipeline owns the only side effects (store writes and audit events) and
//! recovers from name races reported by the store.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod cancel;
pub mod ingest;
pub mod normalizer;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cancel::CancelToken;
pub use ingest::CatalogIngestor;
pub use ingest::DEFAULT_MAX_NAME_ATTEMPTS;
pub use ingest::IngestError;
pub use ingest::IngestFailure;
pub use ingest::IngestOptions;
pub use ingest::IngestReport;
pub use ingest::parse_descriptors;
pub use normalizer::DEFAULT_MAX_NAME_LEN;
pub use normalizer::DEFAULT_SUFFIX_LEN;
pub use normalizer::FALLBACK_TOOL_NAME;
pub use normalizer::MAX_SLUG_LENGTH;
pub use normalizer::NormalizedTool;
pub use normalizer::NormalizerOptions;
pub use normalizer::ToolNormalizer;
pub use normalizer::normalize;
pub use normalizer::slugify;
pub use store::InMemoryCatalogStore;
