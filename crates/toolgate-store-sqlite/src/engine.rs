// crates/toolgate-store-sqlite/src/engine.rs
// ============================================================================
// Module: Migration Engine
// Description: Offline script rendering and online transactional migration.
// Purpose: Move a catalog database between schema versions safely.
// Dependencies: crate::migrations, toolgate-core, rusqlite, serde, tracing
// ============================================================================

//! ## Overview
//! The engine owns three bookkeeping tables that sit outside the versioned
//! steps: the recorded schema version, an advisory lock row, and an
//! append-only migration log.
//!
//! Offline runs are pure and render reviewable SQL. Online runs take the
//! advisory lock with a plain insert, so a concurrent run is rejected rather
//! than raced. Each step commits in its own transaction together with its
//! version update and log row; a failed or cancelled step rolls back and the
//! run reports the last committed version.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Serialize;
use toolgate_core::AuditOutcome;
use toolgate_core::AuditSink;
use toolgate_core::CancelToken;
use toolgate_core::MigrationAuditEvent;
use toolgate_core::MigrationAuditEventParams;
use toolgate_core::NoopAuditSink;

use crate::migrations::MigrationAction;
use crate::migrations::MigrationDirection;
use crate::migrations::MigrationError;
use crate::migrations::MigrationFailure;
use crate::migrations::MigrationRegistry;
use crate::migrations::MigrationStep;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default advisory lock holder label.
pub const DEFAULT_LOCK_HOLDER: &str = "toolgate";

/// Table recording the current schema version.
const VERSION_TABLE: &str = "toolgate_schema_version";

/// Bookkeeping DDL shared by offline scripts and online runs.
const BOOKKEEPING_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS toolgate_schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
)",
    "INSERT OR IGNORE INTO toolgate_schema_version (id, version) VALUES (1, 0)",
    "CREATE TABLE IF NOT EXISTS toolgate_migration_lock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    holder TEXT NOT NULL,
    acquired_at_ms INTEGER NOT NULL
)",
    "CREATE TABLE IF NOT EXISTS toolgate_migration_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    version INTEGER NOT NULL,
    direction TEXT NOT NULL,
    applied_at_ms INTEGER NOT NULL
)",
];

// ============================================================================
// SECTION: Results
// ============================================================================

/// Statements for one transition of an offline script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepScript {
    /// Step version.
    pub version: u32,
    /// Step name.
    pub name: &'static str,
    /// Transition direction.
    pub direction: MigrationDirection,
    /// Schema statements of the step.
    pub statements: Vec<String>,
    /// Bookkeeping statements (version update and log row).
    pub bookkeeping: Vec<String>,
}

impl StepScript {
    /// Returns the file name used when writing the script to disk.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{:04}_{}.{}.sql", self.version, self.name, self.direction.label())
    }

    /// Renders the step as one transaction.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "-- {} {} ({})\nBEGIN IMMEDIATE;\n",
            self.direction.label(),
            self.version,
            self.name
        );
        for statement in self.statements.iter().chain(&self.bookkeeping) {
            let _ = writeln!(out, "{statement};");
        }
        out.push_str("COMMIT;\n");
        out
    }
}

/// Reviewable SQL produced without touching a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineScript {
    /// Starting version.
    pub from: u32,
    /// Target version.
    pub to: u32,
    /// Bookkeeping DDL to run once before the steps.
    pub preamble: Vec<String>,
    /// One entry per transition, in execution order.
    pub steps: Vec<StepScript>,
}

impl OfflineScript {
    /// Renders the full script.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("-- toolgate schema migration {} -> {}\n", self.from, self.to);
        for statement in &self.preamble {
            let _ = writeln!(out, "{statement};");
        }
        for step in &self.steps {
            out.push('\n');
            out.push_str(&step.render());
        }
        out
    }

    /// Writes the preamble and one file per step into `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Io`] when the directory or a file cannot be
    /// written.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
        fs::create_dir_all(dir).map_err(|err| MigrationError::Io(err.to_string()))?;
        let mut written = Vec::with_capacity(self.steps.len() + 1);
        let mut preamble = String::new();
        for statement in &self.preamble {
            let _ = writeln!(preamble, "{statement};");
        }
        let preamble_path = dir.join("0000_bookkeeping.sql");
        fs::write(&preamble_path, preamble).map_err(|err| MigrationError::Io(err.to_string()))?;
        written.push(preamble_path);
        for step in &self.steps {
            let path = dir.join(step.file_name());
            fs::write(&path, step.render()).map_err(|err| MigrationError::Io(err.to_string()))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Result of a successful online run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OnlineOutcome {
    /// Steps were applied.
    Applied {
        /// Version before the run.
        from: u32,
        /// Version after the run.
        to: u32,
        /// Number of steps applied.
        steps: usize,
    },
    /// The database was already at the target.
    NoPendingMigrations {
        /// Current version.
        version: u32,
    },
}

/// Row of the append-only migration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationLogEntry {
    /// Step version.
    pub version: u32,
    /// Direction label.
    pub direction: String,
    /// Commit time (milliseconds since epoch).
    pub applied_at_ms: i64,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Runs a [`MigrationRegistry`] offline or against a live connection.
pub struct MigrationEngine {
    /// Validated step registry.
    registry: MigrationRegistry,
    /// Audit sink for step outcomes.
    audit: Arc<dyn AuditSink>,
    /// Advisory lock holder label.
    lock_holder: String,
}

impl MigrationEngine {
    /// Creates an engine with a no-op audit sink.
    #[must_use]
    pub fn new(registry: MigrationRegistry) -> Self {
        Self {
            registry,
            audit: Arc::new(NoopAuditSink),
            lock_holder: DEFAULT_LOCK_HOLDER.to_string(),
        }
    }

    /// Creates an engine for the catalog schema history.
    #[must_use]
    pub fn catalog() -> Self {
        Self::new(MigrationRegistry::catalog())
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the advisory lock holder label.
    #[must_use]
    pub fn with_lock_holder(mut self, holder: impl Into<String>) -> Self {
        self.lock_holder = holder.into();
        self
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Returns the registered steps in version order.
    #[must_use]
    pub fn history(&self) -> &[MigrationStep] {
        self.registry.steps()
    }

    // ------------------------------------------------------------------------
    // Offline
    // ------------------------------------------------------------------------

    /// Renders the script that moves an empty database to `target`.
    ///
    /// # Errors
    ///
    /// See [`Self::run_offline_from`].
    pub fn run_offline(&self, target: u32) -> Result<OfflineScript, MigrationError> {
        self.run_offline_from(0, target)
    }

    /// Renders the script that moves a database from `from` to `target`.
    ///
    /// Never opens a connection. Downgrades list steps in descending order.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownVersion`] for versions beyond the head
    /// and [`MigrationError::OfflineUnsupported`] naming the first step whose
    /// action needs live data.
    pub fn run_offline_from(
        &self,
        from: u32,
        target: u32,
    ) -> Result<OfflineScript, MigrationError> {
        let (direction, steps) = self.registry.plan(from, target)?;
        let mut scripts = Vec::with_capacity(steps.len());
        for step in steps {
            let MigrationAction::Sql(statements) = step.action(direction) else {
                return Err(MigrationError::OfflineUnsupported {
                    version: step.version,
                    name: step.name,
                });
            };
            let resulting = step.resulting_version(direction);
            scripts.push(StepScript {
                version: step.version,
                name: step.name,
                direction,
                statements: statements.iter().map(|sql| (*sql).to_string()).collect(),
                bookkeeping: vec![
                    format!("UPDATE {VERSION_TABLE} SET version = {resulting} WHERE id = 1"),
                    format!(
                        "INSERT INTO toolgate_migration_log (version, direction, applied_at_ms) \
                         VALUES ({}, '{}', CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
                        step.version,
                        direction.label()
                    ),
                ],
            });
        }
        Ok(OfflineScript {
            from,
            to: target,
            preamble: BOOKKEEPING_DDL.iter().map(|sql| (*sql).to_string()).collect(),
            steps: scripts,
        })
    }

    // ------------------------------------------------------------------------
    // Online
    // ------------------------------------------------------------------------

    /// Applies pending steps up to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationFailure`] carrying the last committed version.
    pub fn run_online(
        &self,
        conn: &mut Connection,
        target: u32,
        cancel: &CancelToken,
    ) -> Result<OnlineOutcome, MigrationFailure> {
        self.run(conn, target, MigrationDirection::Up, cancel)
    }

    /// Upgrades to `target`, or to the registry head when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationFailure`]; a target below the current version is
    /// rejected before any DDL.
    pub fn upgrade(
        &self,
        conn: &mut Connection,
        target: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<OnlineOutcome, MigrationFailure> {
        let target = target.unwrap_or_else(|| self.registry.head());
        self.run(conn, target, MigrationDirection::Up, cancel)
    }

    /// Downgrades to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationFailure`]; a target above the current version is
    /// rejected before any DDL.
    pub fn downgrade(
        &self,
        conn: &mut Connection,
        target: u32,
        cancel: &CancelToken,
    ) -> Result<OnlineOutcome, MigrationFailure> {
        self.run(conn, target, MigrationDirection::Down, cancel)
    }

    /// Returns the recorded schema version (0 for an unmigrated database).
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Db`] when the query fails.
    pub fn current_version(&self, conn: &Connection) -> Result<u32, MigrationError> {
        read_recorded_version(conn)
    }

    /// Removes a stale advisory lock. Returns true when a lock was removed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Db`] when the delete fails.
    pub fn force_unlock(&self, conn: &Connection) -> Result<bool, MigrationError> {
        if !table_exists(conn, "toolgate_migration_lock")? {
            return Ok(false);
        }
        let removed = conn
            .execute("DELETE FROM toolgate_migration_lock WHERE id = 1", params![])
            .map_err(|err| MigrationError::Db(err.to_string()))?;
        if removed > 0 {
            tracing::warn!("migration lock forcibly released");
        }
        Ok(removed > 0)
    }

    /// Returns the applied-step log in commit order.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] when the log cannot be read.
    pub fn applied_log(&self, conn: &Connection) -> Result<Vec<MigrationLogEntry>, MigrationError> {
        if !table_exists(conn, "toolgate_migration_log")? {
            return Ok(Vec::new());
        }
        let mut stmt = conn
            .prepare(
                "SELECT version, direction, applied_at_ms FROM toolgate_migration_log ORDER BY seq",
            )
            .map_err(|err| MigrationError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![], |row| {
                let version: i64 = row.get(0)?;
                Ok((version, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })
            .map_err(|err| MigrationError::Db(err.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            let (version, direction, applied_at_ms) =
                row.map_err(|err| MigrationError::Db(err.to_string()))?;
            entries.push(MigrationLogEntry {
                version: version_from_db(version)?,
                direction,
                applied_at_ms,
            });
        }
        Ok(entries)
    }

    /// Shared online runner; the version is read and planned under the lock.
    fn run(
        &self,
        conn: &mut Connection,
        target: u32,
        expected: MigrationDirection,
        cancel: &CancelToken,
    ) -> Result<OnlineOutcome, MigrationFailure> {
        ensure_bookkeeping(conn).map_err(|error| MigrationFailure {
            at_version: 0,
            failed_version: None,
            error,
        })?;
        if let Err(error) = acquire_lock(conn, &self.lock_holder) {
            return Err(MigrationFailure {
                at_version: recorded_or(conn, 0),
                failed_version: None,
                error,
            });
        }
        let result = self.run_locked(conn, target, expected, cancel);
        let released = release_lock(conn, &self.lock_holder);
        let outcome = result?;
        released.map_err(|error| MigrationFailure {
            at_version: recorded_or(conn, target),
            failed_version: None,
            error,
        })?;
        Ok(outcome)
    }

    /// Plans and applies steps while the advisory lock is held.
    fn run_locked(
        &self,
        conn: &mut Connection,
        target: u32,
        expected: MigrationDirection,
        cancel: &CancelToken,
    ) -> Result<OnlineOutcome, MigrationFailure> {
        let fail = |at_version: u32, error: MigrationError| MigrationFailure {
            at_version,
            failed_version: None,
            error,
        };
        let current = read_recorded_version(conn).map_err(|error| fail(0, error))?;
        let (direction, steps) =
            self.registry.plan(current, target).map_err(|error| fail(current, error))?;
        if current == target {
            tracing::info!(version = current, "no pending migrations");
            return Ok(OnlineOutcome::NoPendingMigrations {
                version: current,
            });
        }
        if direction != expected {
            return Err(fail(
                current,
                MigrationError::DirectionMismatch {
                    direction: expected,
                    current,
                    target,
                },
            ));
        }
        let applied = self.apply_steps(conn, &steps, direction, current, cancel)?;
        tracing::info!(from = current, to = target, steps = applied, "migration run complete");
        Ok(OnlineOutcome::Applied {
            from: current,
            to: target,
            steps: applied,
        })
    }

    /// Applies planned steps one transaction at a time.
    fn apply_steps(
        &self,
        conn: &mut Connection,
        steps: &[&MigrationStep],
        direction: MigrationDirection,
        start: u32,
        cancel: &CancelToken,
    ) -> Result<usize, MigrationFailure> {
        let mut at_version = start;
        for step in steps {
            if cancel.is_cancelled() {
                tracing::info!(version = at_version, "migration run cancelled");
                return Err(MigrationFailure {
                    at_version,
                    failed_version: None,
                    error: MigrationError::Cancelled,
                });
            }
            let resulting = step.resulting_version(direction);
            tracing::info!(
                version = step.version,
                name = step.name,
                direction = direction.label(),
                "applying migration step"
            );
            match apply_step(conn, step, direction, cancel) {
                Ok(()) => {
                    self.record_audit(step, direction, resulting, None);
                    at_version = resulting;
                }
                Err(error) => {
                    // The failed transaction rolled back; report what the database records.
                    let at_version = recorded_or(conn, at_version);
                    tracing::warn!(version = step.version, error = %error, "migration step failed");
                    self.record_audit(step, direction, at_version, Some(error.to_string()));
                    return Err(MigrationFailure {
                        at_version,
                        failed_version: Some(step.version),
                        error,
                    });
                }
            }
        }
        Ok(steps.len())
    }

    /// Emits a migration audit event.
    fn record_audit(
        &self,
        step: &MigrationStep,
        direction: MigrationDirection,
        resulting_version: u32,
        error: Option<String>,
    ) {
        let outcome = if error.is_some() { AuditOutcome::Failed } else { AuditOutcome::Accepted };
        self.audit.record_migration(&MigrationAuditEvent::new(MigrationAuditEventParams {
            version: step.version,
            name: step.name.to_string(),
            direction: direction.label().to_string(),
            resulting_version,
            outcome,
            error,
        }));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs one step, its version update, and its log row in a single transaction.
fn apply_step(
    conn: &mut Connection,
    step: &MigrationStep,
    direction: MigrationDirection,
    cancel: &CancelToken,
) -> Result<(), MigrationError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| MigrationError::Db(err.to_string()))?;
    let found = read_recorded_version(&tx)?;
    let expected = step.expected_version(direction);
    if found != expected {
        return Err(MigrationError::OutOfOrder {
            expected,
            found,
        });
    }
    let action = step.action(direction);
    for statement in action.statements() {
        tx.execute_batch(statement).map_err(|err| MigrationError::Db(err.to_string()))?;
    }
    if let MigrationAction::Live {
        apply, ..
    } = action
    {
        apply(&tx)?;
    }
    write_version(&tx, step.resulting_version(direction))?;
    tx.execute(
        "INSERT INTO toolgate_migration_log (version, direction, applied_at_ms)
         VALUES (?1, ?2, ?3)",
        params![i64::from(step.version), direction.label(), unix_millis()],
    )
    .map_err(|err| MigrationError::Db(err.to_string()))?;
    if cancel.is_cancelled() {
        return Err(MigrationError::Cancelled);
    }
    tx.commit().map_err(|err| MigrationError::Db(err.to_string()))
}

/// Creates bookkeeping tables when missing.
fn ensure_bookkeeping(conn: &Connection) -> Result<(), MigrationError> {
    for statement in BOOKKEEPING_DDL {
        conn.execute_batch(statement).map_err(|err| MigrationError::Db(err.to_string()))?;
    }
    Ok(())
}

/// Reads the recorded version; a database without bookkeeping is version 0.
pub(crate) fn read_recorded_version(conn: &Connection) -> Result<u32, MigrationError> {
    if !table_exists(conn, VERSION_TABLE)? {
        return Ok(0);
    }
    let version: Option<i64> = conn
        .query_row("SELECT version FROM toolgate_schema_version WHERE id = 1", params![], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| MigrationError::Db(err.to_string()))?;
    version.map_or(Ok(0), version_from_db)
}

/// Reads the recorded version, falling back when the read itself fails.
fn recorded_or(conn: &Connection, fallback: u32) -> u32 {
    read_recorded_version(conn).unwrap_or(fallback)
}

/// Records a new schema version.
fn write_version(tx: &Transaction<'_>, version: u32) -> Result<(), MigrationError> {
    tx.execute(
        "UPDATE toolgate_schema_version SET version = ?1 WHERE id = 1",
        params![i64::from(version)],
    )
    .map_err(|err| MigrationError::Db(err.to_string()))?;
    Ok(())
}

/// Takes the advisory lock; a held lock is reported with its holder.
fn acquire_lock(conn: &Connection, holder: &str) -> Result<(), MigrationError> {
    let result = conn.execute(
        "INSERT INTO toolgate_migration_lock (id, holder, acquired_at_ms) VALUES (1, ?1, ?2)",
        params![holder, unix_millis()],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            let holder: String = conn
                .query_row(
                    "SELECT holder FROM toolgate_migration_lock WHERE id = 1",
                    params![],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| MigrationError::Db(err.to_string()))?
                .unwrap_or_default();
            Err(MigrationError::Locked {
                holder,
            })
        }
        Err(err) => Err(MigrationError::Db(err.to_string())),
    }
}

/// Releases the advisory lock held by `holder`.
fn release_lock(conn: &Connection, holder: &str) -> Result<(), MigrationError> {
    conn.execute(
        "DELETE FROM toolgate_migration_lock WHERE id = 1 AND holder = ?1",
        params![holder],
    )
    .map_err(|err| MigrationError::Db(err.to_string()))?;
    Ok(())
}

/// Returns true when a table exists.
fn table_exists(conn: &Connection, table: &str) -> Result<bool, MigrationError> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(|err| MigrationError::Db(err.to_string()))
}

/// Converts a stored version into `u32`.
fn version_from_db(value: i64) -> Result<u32, MigrationError> {
    u32::try_from(value)
        .map_err(|_| MigrationError::Data(format!("invalid recorded schema version: {value}")))
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
