// crates/toolgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Toolgate Interfaces
// Description: Backend-agnostic persistence interface for the tool catalog.
// Purpose: Define the contract between ingestion and storage backends.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The catalog store is the single source of truth for name uniqueness.
//! Implementations must make the "is this name free" check and the write one
//! indivisible operation; callers recover from [`StoreError::NameConflict`] by
//! re-normalizing with a disambiguated name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::CanonicalTool;
use crate::core::ToolId;
use crate::core::ToolName;

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

/// Catalog store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Another tool already holds the requested name.
    #[error("catalog name conflict: {name}")]
    NameConflict {
        /// Conflicting tool name.
        name: String,
    },
    /// The identifier belongs to a deleted tool and may not be reused.
    #[error("catalog id retired: {id}")]
    IdRetired {
        /// Retired tool identifier.
        id: String,
    },
    /// Store I/O error.
    #[error("catalog store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("catalog store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("catalog store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("catalog store invalid data: {0}")]
    Invalid(String),
    /// Database backend reported an error.
    #[error("catalog store db error: {0}")]
    Db(String),
}

impl StoreError {
    /// Returns true when the error is the expected name-uniqueness race.
    #[must_use]
    pub const fn is_name_conflict(&self) -> bool {
        matches!(self, Self::NameConflict { .. })
    }
}

/// Persistence interface for canonical tools.
pub trait CatalogStore {
    /// Inserts or replaces a tool keyed by its identifier.
    ///
    /// The name-uniqueness check and the write are atomic.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NameConflict`] when another tool holds the name,
    /// [`StoreError::IdRetired`] when the identifier was deleted, and other
    /// variants when the backend fails.
    fn put(&self, tool: &CanonicalTool) -> Result<(), StoreError>;

    /// Loads a tool by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_by_id(&self, id: &ToolId) -> Result<Option<CanonicalTool>, StoreError>;

    /// Loads a tool by canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_by_name(&self, name: &ToolName) -> Result<Option<CanonicalTool>, StoreError>;

    /// Lists all tools ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list(&self) -> Result<Vec<CanonicalTool>, StoreError>;

    /// Deletes a tool and retires its identifier. Deleting an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when deletion fails.
    fn delete(&self, id: &ToolId) -> Result<(), StoreError>;

    /// Checks whether the store is ready to serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is not ready.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
