// crates/toolgate-core/src/runtime/store.rs
// ============================================================================
// Module: Toolgate In-Memory Store
// Description: Simple in-memory catalog store for tests and demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`CatalogStore`]. All
//! state sits behind one mutex, which makes the name check and the write a
//! single atomic step. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::CanonicalTool;
use crate::core::ToolId;
use crate::core::ToolName;
use crate::interfaces::CatalogStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Catalog state guarded by the store mutex.
#[derive(Debug, Default)]
struct CatalogState {
    /// Tools keyed by id.
    by_id: BTreeMap<String, CanonicalTool>,
    /// Tool ids keyed by name.
    names: BTreeMap<String, String>,
    /// Retired ids.
    tombstones: BTreeSet<String>,
}

/// In-memory catalog store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalogStore {
    /// Catalog state protected by a mutex.
    state: Arc<Mutex<CatalogState>>,
}

impl InMemoryCatalogStore {
    /// Creates an empty in-memory catalog store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the catalog state.
    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Io("catalog store mutex poisoned".to_string()))
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn put(&self, tool: &CanonicalTool) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let id = tool.id().as_str();
        let name = tool.name().as_str();
        if guard.tombstones.contains(id) {
            return Err(StoreError::IdRetired {
                id: id.to_string(),
            });
        }
        if let Some(holder) = guard.names.get(name)
            && holder != id
        {
            return Err(StoreError::NameConflict {
                name: name.to_string(),
            });
        }
        if let Some(previous) = guard.by_id.insert(id.to_string(), tool.clone())
            && previous.name() != tool.name()
        {
            guard.names.remove(previous.name().as_str());
        }
        guard.names.insert(name.to_string(), id.to_string());
        drop(guard);
        Ok(())
    }

    fn get_by_id(&self, id: &ToolId) -> Result<Option<CanonicalTool>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.by_id.get(id.as_str()).cloned())
    }

    fn get_by_name(&self, name: &ToolName) -> Result<Option<CanonicalTool>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.names.get(name.as_str()).and_then(|id| guard.by_id.get(id)).cloned())
    }

    fn list(&self) -> Result<Vec<CanonicalTool>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.names.values().filter_map(|id| guard.by_id.get(id)).cloned().collect())
    }

    fn delete(&self, id: &ToolId) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if let Some(removed) = guard.by_id.remove(id.as_str()) {
            guard.names.remove(removed.name().as_str());
            guard.tombstones.insert(id.as_str().to_string());
        }
        drop(guard);
        Ok(())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
