// crates/toolgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Toolgate SQLite Store
// Description: SQLite catalog store and schema migration engine.
// Purpose: Provide durable catalog persistence with versioned schema changes.
// Dependencies: toolgate-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteCatalogStore`], a durable
//! [`toolgate_core::CatalogStore`], and the [`MigrationEngine`] that moves a
//! catalog database between registered schema versions. The store refuses to
//! open a database that is not at the registry head; migrating is always an
//! explicit operator step.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod catalog_schema;
pub mod engine;
pub mod migrations;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::DEFAULT_LOCK_HOLDER;
pub use engine::MigrationEngine;
pub use engine::MigrationLogEntry;
pub use engine::OfflineScript;
pub use engine::OnlineOutcome;
pub use engine::StepScript;
pub use migrations::LiveMigrationFn;
pub use migrations::MigrationAction;
pub use migrations::MigrationDirection;
pub use migrations::MigrationError;
pub use migrations::MigrationFailure;
pub use migrations::MigrationRegistry;
pub use migrations::MigrationStep;
pub use migrations::MigrationSummary;
pub use store::SqliteCatalogStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::connect;
