// crates/toolgate-store-sqlite/src/catalog_schema.rs
// ============================================================================
// Module: Catalog Schema History
// Description: Versioned DDL for the tool catalog tables.
// Purpose: Register every catalog schema change as an ordered migration step.
// Dependencies: crate::migrations, toolgate-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Version 4 is the layout [`crate::SqliteCatalogStore`] reads and writes.
//! Step 4 backfills input schema hashes from live rows, so it can only run
//! online.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Transaction;
use rusqlite::params;
use serde_json::Value;
use toolgate_core::DEFAULT_HASH_ALGORITHM;
use toolgate_core::hashing::canonical_json_bytes;
use toolgate_core::hashing::hash_bytes;
use toolgate_core::repair_input_schema;

use crate::migrations::MigrationAction;
use crate::migrations::MigrationError;
use crate::migrations::MigrationStep;

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Version 1: catalog table.
const CREATE_TOOLS_UP: &[&str] = &["CREATE TABLE tools (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    original_name TEXT NOT NULL,
    url TEXT NOT NULL,
    description TEXT NOT NULL,
    input_schema TEXT NOT NULL,
    annotations TEXT NOT NULL
)"];
/// Version 1 reverse.
const CREATE_TOOLS_DOWN: &[&str] = &["DROP TABLE tools"];

/// Version 2: retired identifiers.
const CREATE_ID_TOMBSTONES_UP: &[&str] = &["CREATE TABLE tool_id_tombstones (
    id TEXT PRIMARY KEY NOT NULL,
    retired_at INTEGER NOT NULL
)"];
/// Version 2 reverse.
const CREATE_ID_TOMBSTONES_DOWN: &[&str] = &["DROP TABLE tool_id_tombstones"];

/// Version 3: timestamps and lookup by original name.
const ADD_TIMESTAMPS_UP: &[&str] = &[
    "ALTER TABLE tools ADD COLUMN created_at INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE tools ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0",
    "CREATE INDEX idx_tools_original_name ON tools (original_name)",
];
/// Version 3 reverse.
const ADD_TIMESTAMPS_DOWN: &[&str] = &[
    "DROP INDEX idx_tools_original_name",
    "ALTER TABLE tools DROP COLUMN updated_at",
    "ALTER TABLE tools DROP COLUMN created_at",
];

/// Version 4: schema integrity hash column (backfilled from live rows).
const ADD_INPUT_SCHEMA_HASH_UP: &[&str] =
    &["ALTER TABLE tools ADD COLUMN input_schema_hash TEXT NOT NULL DEFAULT ''"];
/// Version 4 reverse.
const ADD_INPUT_SCHEMA_HASH_DOWN: &[&str] = &["ALTER TABLE tools DROP COLUMN input_schema_hash"];

/// Returns the catalog schema history in version order.
pub(crate) fn catalog_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep {
            version: 1,
            name: "create_tools",
            depends_on: None,
            up: MigrationAction::Sql(CREATE_TOOLS_UP),
            down: MigrationAction::Sql(CREATE_TOOLS_DOWN),
        },
        MigrationStep {
            version: 2,
            name: "create_id_tombstones",
            depends_on: Some(1),
            up: MigrationAction::Sql(CREATE_ID_TOMBSTONES_UP),
            down: MigrationAction::Sql(CREATE_ID_TOMBSTONES_DOWN),
        },
        MigrationStep {
            version: 3,
            name: "add_timestamps",
            depends_on: Some(2),
            up: MigrationAction::Sql(ADD_TIMESTAMPS_UP),
            down: MigrationAction::Sql(ADD_TIMESTAMPS_DOWN),
        },
        MigrationStep {
            version: 4,
            name: "add_input_schema_hash",
            depends_on: Some(3),
            up: MigrationAction::Live {
                sql: ADD_INPUT_SCHEMA_HASH_UP,
                apply: backfill_input_schema_hash,
                description: "rewrite stored input schemas canonically and record their sha256",
            },
            down: MigrationAction::Sql(ADD_INPUT_SCHEMA_HASH_DOWN),
        },
    ]
}

// ============================================================================
// SECTION: Data Migrations
// ============================================================================

/// Canonicalizes every stored input schema and records its hash.
///
/// Rows written before schemas were repaired on ingest are repaired here;
/// text that is not JSON fails the step.
fn backfill_input_schema_hash(tx: &Transaction<'_>) -> Result<(), MigrationError> {
    let rows: Vec<(String, String)> = {
        let mut stmt = tx
            .prepare("SELECT id, input_schema FROM tools ORDER BY id")
            .map_err(|err| MigrationError::Db(err.to_string()))?;
        let mapped = stmt
            .query_map(params![], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|err| MigrationError::Db(err.to_string()))?;
        mapped.collect::<Result<_, _>>().map_err(|err| MigrationError::Db(err.to_string()))?
    };
    for (id, schema_text) in &rows {
        let value: Value = serde_json::from_str(schema_text).map_err(|err| {
            MigrationError::Data(format!("input_schema of tool {id} is not json: {err}"))
        })?;
        let (schema, _log) = repair_input_schema(&value);
        let canonical = canonical_json_bytes(&schema)
            .map_err(|err| MigrationError::Data(err.to_string()))?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &canonical);
        let canonical_text = String::from_utf8(canonical)
            .map_err(|err| MigrationError::Data(err.to_string()))?;
        tx.execute(
            "UPDATE tools SET input_schema = ?1, input_schema_hash = ?2 WHERE id = ?3",
            params![canonical_text, digest.value, id],
        )
        .map_err(|err| MigrationError::Db(err.to_string()))?;
    }
    tracing::info!(rows = rows.len(), "backfilled input schema hashes");
    Ok(())
}
