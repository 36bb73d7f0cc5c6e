// crates/toolgate-config/src/config.rs
// ============================================================================
// Module: Toolgate Configuration
// Description: Configuration loading and validation for Toolgate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: toolgate-core, toolgate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `TOOLGATE_CONFIG`, then
//! `toolgate.toml` in the working directory. Every section has defaults, so
//! an empty file is a valid configuration; invalid values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use toolgate_core::AuditSink;
use toolgate_core::FileAuditSink;
use toolgate_core::IngestOptions;
use toolgate_core::NoopAuditSink;
use toolgate_core::NormalizerOptions;
use toolgate_core::StderrAuditSink;
use toolgate_core::runtime::DEFAULT_MAX_NAME_ATTEMPTS;
use toolgate_core::runtime::DEFAULT_MAX_NAME_LEN;
use toolgate_core::runtime::DEFAULT_SUFFIX_LEN;
use toolgate_core::runtime::MAX_SLUG_LENGTH;
use toolgate_store_sqlite::DEFAULT_LOCK_HOLDER;
use toolgate_store_sqlite::SqliteStoreConfig;
use toolgate_store_sqlite::SqliteStoreMode;
use toolgate_store_sqlite::SqliteSyncMode;
use toolgate_store_sqlite::store::MAX_READ_POOL_SIZE;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "toolgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "TOOLGATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Connection string scheme accepted for the catalog database.
const SQLITE_SCHEME: &str = "sqlite://";
/// Maximum length of the migration lock holder label.
const MAX_LOCK_HOLDER_LENGTH: usize = 128;
/// Upper bound for `ingest.max_name_attempts`.
const MAX_NAME_ATTEMPTS_LIMIT: usize = 64;
/// Upper bound for `ingest.suffix_len` (hex digits of a SHA-256 digest).
const MAX_SUFFIX_LEN: usize = 64;
/// Upper bound for `ingest.max_batch_bytes`.
pub const MAX_BATCH_BYTES_LIMIT: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Root
// ============================================================================

/// Toolgate configuration root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolgateConfig {
    /// Catalog database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Migration engine configuration.
    #[serde(default)]
    pub migrations: MigrationsConfig,
    /// Ingestion pipeline configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl ToolgateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.migrations.validate()?;
        self.ingest.validate()?;
        self.audit.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Database
// ============================================================================

/// Catalog database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// `sqlite://<path>` or a bare file path.
    #[serde(default = "default_connection_string", alias = "connectionString")]
    pub connection_string: String,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read connections held by the store.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

impl DatabaseConfig {
    /// Returns the database file path named by the connection string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unsupported schemes or unsafe
    /// paths.
    pub fn sqlite_path(&self) -> Result<PathBuf, ConfigError> {
        let value = self.connection_string.trim();
        let path = match value.strip_prefix(SQLITE_SCHEME) {
            Some(path) => path,
            None if value.contains("://") => {
                return Err(ConfigError::Invalid(
                    "database.connection_string must use the sqlite:// scheme or a file path"
                        .to_string(),
                ));
            }
            None => value,
        };
        validate_path_string("database.connection_string", path)?;
        Ok(PathBuf::from(path))
    }

    /// Builds the store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the connection string is invalid.
    pub fn store_config(&self) -> Result<SqliteStoreConfig, ConfigError> {
        Ok(SqliteStoreConfig {
            path: self.sqlite_path()?,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            read_pool_size: self.read_pool_size,
        })
    }

    /// Validates database configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.sqlite_path()?;
        if self.read_pool_size == 0 || self.read_pool_size > MAX_READ_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "database.read_pool_size must be between 1 and {MAX_READ_POOL_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Returns the default catalog connection string.
fn default_connection_string() -> String {
    "sqlite://toolgate.db".to_string()
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    4
}

// ============================================================================
// SECTION: Migrations
// ============================================================================

/// Migration engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Directory receiving offline SQL scripts.
    #[serde(default = "default_script_location", alias = "scriptLocation")]
    pub script_location: PathBuf,
    /// Label recorded in the advisory lock row.
    #[serde(default = "default_lock_holder")]
    pub lock_holder: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            script_location: default_script_location(),
            lock_holder: default_lock_holder(),
        }
    }
}

impl MigrationsConfig {
    /// Validates migration configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string(
            "migrations.script_location",
            &self.script_location.to_string_lossy(),
        )?;
        let holder = self.lock_holder.trim();
        if holder.is_empty() || holder.len() > MAX_LOCK_HOLDER_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "migrations.lock_holder must be 1 to {MAX_LOCK_HOLDER_LENGTH} characters"
            )));
        }
        Ok(())
    }
}

/// Returns the default offline script directory.
fn default_script_location() -> PathBuf {
    PathBuf::from("migrations/sql")
}

/// Returns the default lock holder label.
fn default_lock_holder() -> String {
    DEFAULT_LOCK_HOLDER.to_string()
}

// ============================================================================
// SECTION: Ingest
// ============================================================================

/// Ingestion pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Maximum normalize/put attempts per descriptor.
    #[serde(default = "default_max_name_attempts")]
    pub max_name_attempts: usize,
    /// Initial collision suffix length.
    #[serde(default = "default_suffix_len")]
    pub suffix_len: usize,
    /// Maximum slug length before a suffix is appended.
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
    /// Maximum size of one descriptor batch file.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_name_attempts: default_max_name_attempts(),
            suffix_len: default_suffix_len(),
            max_name_len: default_max_name_len(),
            max_batch_bytes: default_max_batch_bytes(),
        }
    }
}

impl IngestConfig {
    /// Returns pipeline options for the ingestor.
    #[must_use]
    pub const fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            max_name_attempts: self.max_name_attempts,
            normalizer: NormalizerOptions {
                suffix_len: self.suffix_len,
                max_name_len: self.max_name_len,
            },
        }
    }

    /// Validates ingestion configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("ingest.max_name_attempts", self.max_name_attempts, MAX_NAME_ATTEMPTS_LIMIT)?;
        check_range("ingest.suffix_len", self.suffix_len, MAX_SUFFIX_LEN)?;
        check_range("ingest.max_name_len", self.max_name_len, MAX_SLUG_LENGTH)?;
        check_range("ingest.max_batch_bytes", self.max_batch_bytes, MAX_BATCH_BYTES_LIMIT)
    }
}

/// Returns the default attempt bound.
const fn default_max_name_attempts() -> usize {
    DEFAULT_MAX_NAME_ATTEMPTS
}

/// Returns the default suffix length.
const fn default_suffix_len() -> usize {
    DEFAULT_SUFFIX_LEN
}

/// Returns the default slug length bound.
const fn default_max_name_len() -> usize {
    DEFAULT_MAX_NAME_LEN
}

/// Returns the default batch size bound.
const fn default_max_batch_bytes() -> usize {
    8 * 1024 * 1024
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `audit.path`.
    File,
    /// Discard audit events.
    None,
}

/// Audit sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path (file sink only).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file sink cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        match self.sink {
            AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkKind::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("file audit sink requires audit.path".to_string())
                })?;
                let sink =
                    FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
        }
    }

    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires audit.path".to_string()))
            }
            (AuditSinkKind::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkKind::Stderr | AuditSinkKind::None, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid for the file audit sink".to_string(),
            )),
            (AuditSinkKind::Stderr | AuditSinkKind::None, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Checks that `value` lies in `1 ..= max`.
fn check_range(field: &str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(ConfigError::Invalid(format!("{field} must be between 1 and {max}")));
    }
    Ok(())
}
