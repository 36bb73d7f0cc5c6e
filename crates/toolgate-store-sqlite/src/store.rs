// crates/toolgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Catalog Store
// Description: Durable CatalogStore backed by SQLite WAL.
// Purpose: Persist canonical tools with atomic name uniqueness and integrity.
// Dependencies: toolgate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteCatalogStore`] persists canonical tools in the `tools` table laid
//! out by the catalog migration history. Input schemas are stored as
//! canonical JSON together with their SHA-256 digest; reads recompute the
//! digest and fail closed with [`StoreError::Corrupt`] on mismatch.
//!
//! The store never migrates. Opening a database whose recorded schema version
//! is not the registry head fails with [`SqliteStoreError::VersionMismatch`].
//! Writes go through one connection with `BEGIN IMMEDIATE` transactions; reads
//! rotate over a small pool of connections.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use toolgate_core::CanonicalTool;
use toolgate_core::CanonicalToolParams;
use toolgate_core::CatalogStore;
use toolgate_core::DEFAULT_HASH_ALGORITHM;
use toolgate_core::InputSchema;
use toolgate_core::StoreError;
use toolgate_core::ToolId;
use toolgate_core::ToolName;
use toolgate_core::hashing::canonical_json_bytes;
use toolgate_core::hashing::hash_bytes;

use crate::engine::read_recorded_version;
use crate::migrations::MigrationRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of read connections.
pub const MAX_READ_POOL_SIZE: usize = 64;

/// Column list shared by every tool read.
const TOOL_COLUMNS: &str =
    "id, name, original_name, url, description, input_schema, input_schema_hash, annotations";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the pragma value for the journal mode.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// `SQLite` synchronous mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the pragma value for the sync mode.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Normal => "NORMAL",
        }
    }
}

/// `SQLite` catalog store configuration.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `read_pool_size` is between 1 and [`MAX_READ_POOL_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read connections.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default tuning for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    4
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding stored schema payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Opens a configured connection without checking the schema version.
///
/// Used by the migration engine, which must reach databases at any version.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the path is invalid or the database
/// cannot be opened.
pub fn connect(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    validate_store_path(&config.path)?;
    ensure_parent_dir(&config.path)?;
    open_connection(config)
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed catalog store.
///
/// # Invariants
/// - The recorded schema version equals the catalog registry head.
/// - Tool reads verify the stored input schema hash before decoding.
/// - Write access is serialized through one mutex-guarded connection.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Write connection.
    write_connection: Arc<Mutex<Connection>>,
    /// Read connections.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor over the read pool.
    read_cursor: Arc<AtomicUsize>,
}

impl SqliteCatalogStore {
    /// Opens a migrated catalog database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::VersionMismatch`] when the database is not
    /// at the catalog head version, and other variants when it cannot be
    /// opened.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if config.read_pool_size == 0 || config.read_pool_size > MAX_READ_POOL_SIZE {
            return Err(SqliteStoreError::Invalid(format!(
                "read_pool_size must be between 1 and {MAX_READ_POOL_SIZE}"
            )));
        }
        let write_connection = connect(&config)?;
        check_schema_version(&write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        tracing::debug!(path = %config.path.display(), "opened sqlite catalog store");
        Ok(Self {
            config,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Picks the next read connection.
    fn read_connection(&self) -> &Mutex<Connection> {
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len();
        &self.read_connections[index]
    }

    /// Runs a single-row tool query on a read connection.
    fn fetch_one(
        &self,
        sql: &str,
        key: &str,
    ) -> Result<Option<CanonicalTool>, SqliteStoreError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite read mutex poisoned".to_string()))?;
        let row = guard
            .query_row(sql, params![key], StoredTool::from_row)
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        row.map(StoredTool::into_tool).transpose()
    }

    /// Verifies a connection can execute a simple statement.
    fn check_connection(connection: &Mutex<Connection>) -> Result<(), SqliteStoreError> {
        let guard = connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite mutex poisoned".to_string()))?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn put(&self, tool: &CanonicalTool) -> Result<(), StoreError> {
        let prepared = PreparedTool::new(tool)?;
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite write mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let retired = tx
            .query_row(
                "SELECT 1 FROM tool_id_tombstones WHERE id = ?1",
                params![tool.id().as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if retired.is_some() {
            return Err(StoreError::IdRetired {
                id: tool.id().to_string(),
            });
        }
        let now = unix_millis();
        let result = tx.execute(
            "INSERT INTO tools (id, name, original_name, url, description, input_schema, \
             input_schema_hash, annotations, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
             original_name = excluded.original_name, url = excluded.url, \
             description = excluded.description, input_schema = excluded.input_schema, \
             input_schema_hash = excluded.input_schema_hash, \
             annotations = excluded.annotations, updated_at = excluded.updated_at",
            params![
                tool.id().as_str(),
                tool.name().as_str(),
                tool.original_name(),
                tool.url(),
                tool.description(),
                prepared.input_schema,
                prepared.input_schema_hash,
                prepared.annotations,
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, message))
                if is_name_unique_violation(&err, message.as_deref()) =>
            {
                return Err(StoreError::NameConflict {
                    name: tool.name().to_string(),
                });
            }
            Err(err) => return Err(SqliteStoreError::Db(err.to_string()).into()),
        }
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    fn get_by_id(&self, id: &ToolId) -> Result<Option<CanonicalTool>, StoreError> {
        let sql = format!("SELECT {TOOL_COLUMNS} FROM tools WHERE id = ?1");
        Ok(self.fetch_one(&sql, id.as_str())?)
    }

    fn get_by_name(&self, name: &ToolName) -> Result<Option<CanonicalTool>, StoreError> {
        let sql = format!("SELECT {TOOL_COLUMNS} FROM tools WHERE name = ?1");
        Ok(self.fetch_one(&sql, name.as_str())?)
    }

    fn list(&self) -> Result<Vec<CanonicalTool>, StoreError> {
        let rows = {
            let guard = self
                .read_connection()
                .lock()
                .map_err(|_| SqliteStoreError::Db("sqlite read mutex poisoned".to_string()))?;
            let mut stmt = guard
                .prepare(&format!("SELECT {TOOL_COLUMNS} FROM tools ORDER BY name"))
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let mapped = stmt
                .query_map(params![], StoredTool::from_row)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            mapped
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
        };
        let mut tools = Vec::with_capacity(rows.len());
        for row in rows {
            tools.push(row.into_tool()?);
        }
        Ok(tools)
    }

    fn delete(&self, id: &ToolId) -> Result<(), StoreError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite write mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let removed = tx
            .execute("DELETE FROM tools WHERE id = ?1", params![id.as_str()])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if removed > 0 {
            tx.execute(
                "INSERT OR IGNORE INTO tool_id_tombstones (id, retired_at) VALUES (?1, ?2)",
                params![id.as_str(), unix_millis()],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        Self::check_connection(&self.write_connection)?;
        Self::check_connection(self.read_connection())?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Column values written for a tool.
struct PreparedTool {
    /// Canonical JSON text of the input schema.
    input_schema: String,
    /// Hex digest of `input_schema`.
    input_schema_hash: String,
    /// Canonical JSON text of the annotations.
    annotations: String,
}

impl PreparedTool {
    /// Serializes a tool's JSON columns canonically.
    fn new(tool: &CanonicalTool) -> Result<Self, SqliteStoreError> {
        let schema_bytes = canonical_json_bytes(tool.input_schema())
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &schema_bytes);
        let annotation_bytes = canonical_json_bytes(tool.annotations())
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        Ok(Self {
            input_schema: utf8(schema_bytes)?,
            input_schema_hash: digest.value,
            annotations: utf8(annotation_bytes)?,
        })
    }
}

/// Raw column values read for a tool.
struct StoredTool {
    /// Identifier column.
    id: String,
    /// Name column.
    name: String,
    /// Original name column.
    original_name: String,
    /// URL column.
    url: String,
    /// Description column.
    description: String,
    /// Input schema JSON text.
    input_schema: String,
    /// Stored input schema digest.
    input_schema_hash: String,
    /// Annotations JSON text.
    annotations: String,
}

impl StoredTool {
    /// Reads the columns listed in [`TOOL_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            original_name: row.get(2)?,
            url: row.get(3)?,
            description: row.get(4)?,
            input_schema: row.get(5)?,
            input_schema_hash: row.get(6)?,
            annotations: row.get(7)?,
        })
    }

    /// Verifies integrity and decodes the row strictly.
    fn into_tool(self) -> Result<CanonicalTool, SqliteStoreError> {
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, self.input_schema.as_bytes());
        if digest.value != self.input_schema_hash {
            return Err(SqliteStoreError::Corrupt(format!(
                "input schema hash mismatch for tool {}",
                self.id
            )));
        }
        let name = ToolName::new(self.name);
        if !name.is_canonical() {
            return Err(SqliteStoreError::Invalid(format!(
                "stored name of tool {} is not a canonical slug",
                self.id
            )));
        }
        let input_schema: InputSchema = serde_json::from_str(&self.input_schema)
            .map_err(|err| SqliteStoreError::Invalid(format!("tool {}: {err}", self.id)))?;
        let annotations: Map<String, Value> = serde_json::from_str(&self.annotations)
            .map_err(|err| SqliteStoreError::Invalid(format!("tool {}: {err}", self.id)))?;
        Ok(CanonicalTool::new(CanonicalToolParams {
            id: ToolId::new(self.id),
            name,
            original_name: self.original_name,
            url: self.url,
            description: self.description,
            input_schema,
            annotations,
        }))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects databases that are not at the catalog head version.
fn check_schema_version(connection: &Connection) -> Result<(), SqliteStoreError> {
    let recorded = read_recorded_version(connection)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let head = MigrationRegistry::catalog().head();
    if recorded != head {
        return Err(SqliteStoreError::VersionMismatch(format!(
            "database is at schema version {recorded}, store requires {head}; run migrations"
        )));
    }
    Ok(())
}

/// Converts canonical JSON bytes into text.
fn utf8(bytes: Vec<u8>) -> Result<String, SqliteStoreError> {
    String::from_utf8(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Returns true for the `UNIQUE` failure on `tools.name`; other constraint
/// violations surface as database errors.
fn is_name_unique_violation(err: &rusqlite::ffi::Error, message: Option<&str>) -> bool {
    err.code == ErrorCode::ConstraintViolation
        && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        && message.is_some_and(|text| text.contains("tools.name"))
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
