// crates/toolgate-store-sqlite/src/migrations.rs
// ============================================================================
// Module: Migration Registry
// Description: Statically registered, ordered schema migration steps.
// Purpose: Describe schema history as data that the engine validates and runs.
// Dependencies: rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`MigrationRegistry`] is an explicit, ordered list of [`MigrationStep`]
//! values. Nothing is discovered from the filesystem. Validation runs before
//! any DDL: versions must start at 1 and increase by one, and each step must
//! depend on the previous version.
//!
//! Steps whose forward action must read live rows are declared as
//! [`MigrationAction::Live`]; they can run online but cannot be rendered as an
//! offline script.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rusqlite::Transaction;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Migration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// The registry violates ordering or dependency rules.
    #[error("invalid migration registry: {0}")]
    InvalidRegistry(String),
    /// The requested version is not in the registry.
    #[error("unknown schema version {version} (head is {head})")]
    UnknownVersion {
        /// Requested version.
        version: u32,
        /// Highest registered version.
        head: u32,
    },
    /// The recorded version does not match the step's dependency.
    #[error("out of order migration: expected recorded version {expected}, found {found}")]
    OutOfOrder {
        /// Version the step depends on.
        expected: u32,
        /// Version recorded in the database.
        found: u32,
    },
    /// The target lies in the other direction from the current version.
    #[error("cannot {direction} from version {current} to version {target}")]
    DirectionMismatch {
        /// Requested direction.
        direction: MigrationDirection,
        /// Current recorded version.
        current: u32,
        /// Requested target version.
        target: u32,
    },
    /// A step needs a live connection and cannot be rendered offline.
    #[error("step {version} ({name}) requires a live connection and cannot run offline")]
    OfflineUnsupported {
        /// Step version.
        version: u32,
        /// Step name.
        name: &'static str,
    },
    /// Another migration run holds the advisory lock.
    #[error("migration lock held by {holder}")]
    Locked {
        /// Recorded lock holder.
        holder: String,
    },
    /// The run was cancelled.
    #[error("migration cancelled")]
    Cancelled,
    /// Database reported an error.
    #[error("migration db error: {0}")]
    Db(String),
    /// Live data could not be migrated.
    #[error("migration data error: {0}")]
    Data(String),
    /// Script output failed.
    #[error("migration io error: {0}")]
    Io(String),
}

/// Failure of an online run, reported with the last committed version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stopped at version {at_version} due to error {error}")]
pub struct MigrationFailure {
    /// Last successfully recorded version.
    pub at_version: u32,
    /// Step that failed, when a step had started.
    pub failed_version: Option<u32>,
    /// Underlying error.
    pub error: MigrationError,
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Direction of a migration transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    /// Towards a higher version.
    Up,
    /// Towards a lower version.
    Down,
}

impl MigrationDirection {
    /// Returns the stable label used in logs and script names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "upgrade",
            Self::Down => "downgrade",
        })
    }
}

/// Callback that migrates live rows inside the step transaction.
pub type LiveMigrationFn = fn(&Transaction<'_>) -> Result<(), MigrationError>;

/// Action executed for one direction of a step.
#[derive(Clone, Copy)]
pub enum MigrationAction {
    /// Plain statements; renderable offline.
    Sql(&'static [&'static str]),
    /// Statements followed by a callback over live data; online only.
    Live {
        /// Statements executed before the callback.
        sql: &'static [&'static str],
        /// Data migration callback.
        apply: LiveMigrationFn,
        /// Human-readable summary of the callback.
        description: &'static str,
    },
}

impl MigrationAction {
    /// Returns the statements executed by the action.
    #[must_use]
    pub const fn statements(&self) -> &'static [&'static str] {
        match self {
            Self::Sql(sql)
            | Self::Live {
                sql, ..
            } => *sql,
        }
    }

    /// Returns true when the action can be rendered offline.
    #[must_use]
    pub const fn is_offline_capable(&self) -> bool {
        matches!(self, Self::Sql(_))
    }
}

impl fmt::Debug for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            Self::Live {
                sql,
                description,
                ..
            } => f
                .debug_struct("Live")
                .field("sql", sql)
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}

/// One versioned schema transition.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    /// Version reached after applying `up`.
    pub version: u32,
    /// Short snake_case name.
    pub name: &'static str,
    /// Version that must be recorded before `up` runs (`None` for version 1).
    pub depends_on: Option<u32>,
    /// Forward action.
    pub up: MigrationAction,
    /// Reverse action.
    pub down: MigrationAction,
}

impl MigrationStep {
    /// Returns the version recorded before `up` and after `down`.
    #[must_use]
    pub fn base_version(&self) -> u32 {
        self.depends_on.unwrap_or(0)
    }

    /// Returns the action for a direction.
    #[must_use]
    pub const fn action(&self, direction: MigrationDirection) -> &MigrationAction {
        match direction {
            MigrationDirection::Up => &self.up,
            MigrationDirection::Down => &self.down,
        }
    }

    /// Returns the version recorded after running the step in a direction.
    #[must_use]
    pub fn resulting_version(&self, direction: MigrationDirection) -> u32 {
        match direction {
            MigrationDirection::Up => self.version,
            MigrationDirection::Down => self.base_version(),
        }
    }

    /// Returns the version that must be recorded before running the step.
    #[must_use]
    pub fn expected_version(&self, direction: MigrationDirection) -> u32 {
        match direction {
            MigrationDirection::Up => self.base_version(),
            MigrationDirection::Down => self.version,
        }
    }
}

/// Summary row for registry listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    /// Step version.
    pub version: u32,
    /// Step name.
    pub name: &'static str,
    /// Dependency version.
    pub depends_on: Option<u32>,
    /// True when the forward action can run offline.
    pub offline_capable: bool,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Validated, ordered list of migration steps.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    /// Steps ordered by version.
    steps: Vec<MigrationStep>,
}

impl MigrationRegistry {
    /// Creates a registry after validating ordering and dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidRegistry`] on gaps, duplicates, or
    /// wrong dependencies.
    pub fn new(steps: Vec<MigrationStep>) -> Result<Self, MigrationError> {
        Self::validate(&steps)?;
        Ok(Self {
            steps,
        })
    }

    /// Returns the catalog schema history.
    #[must_use]
    pub fn catalog() -> Self {
        Self {
            steps: crate::catalog_schema::catalog_steps(),
        }
    }

    /// Checks that steps run 1, 2, 3, ... with each depending on the previous.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidRegistry`] describing the first violation.
    pub fn validate(steps: &[MigrationStep]) -> Result<(), MigrationError> {
        let mut previous: Option<u32> = None;
        for step in steps {
            let expected = previous.map_or(1, |version| version.saturating_add(1));
            if step.version != expected {
                return Err(MigrationError::InvalidRegistry(format!(
                    "step {} ({}) found where version {expected} was expected",
                    step.version, step.name
                )));
            }
            if step.depends_on != previous {
                return Err(MigrationError::InvalidRegistry(format!(
                    "step {} ({}) depends on {}, expected {}",
                    step.version,
                    step.name,
                    describe_dependency(step.depends_on),
                    describe_dependency(previous)
                )));
            }
            if step.name.is_empty() {
                return Err(MigrationError::InvalidRegistry(format!(
                    "step {} has an empty name",
                    step.version
                )));
            }
            if !step.down.is_offline_capable() {
                return Err(MigrationError::InvalidRegistry(format!(
                    "step {} ({}) must have a plain sql down action",
                    step.version, step.name
                )));
            }
            previous = Some(step.version);
        }
        Ok(())
    }

    /// Returns the highest registered version (0 when empty).
    #[must_use]
    pub fn head(&self) -> u32 {
        self.steps.last().map_or(0, |step| step.version)
    }

    /// Returns all steps in version order.
    #[must_use]
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Returns a listing of the registry.
    #[must_use]
    pub fn summaries(&self) -> Vec<MigrationSummary> {
        self.steps
            .iter()
            .map(|step| MigrationSummary {
                version: step.version,
                name: step.name,
                depends_on: step.depends_on,
                offline_capable: step.up.is_offline_capable(),
            })
            .collect()
    }

    /// Returns the ordered steps that move `from` to `to`.
    ///
    /// Upgrades list steps ascending; downgrades list them descending.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::UnknownVersion`] when either version exceeds
    /// the head.
    pub fn plan(
        &self,
        from: u32,
        to: u32,
    ) -> Result<(MigrationDirection, Vec<&MigrationStep>), MigrationError> {
        let head = self.head();
        for version in [from, to] {
            if version > head {
                return Err(MigrationError::UnknownVersion {
                    version,
                    head,
                });
            }
        }
        if to >= from {
            let steps = self
                .steps
                .iter()
                .filter(|step| step.version > from && step.version <= to)
                .collect();
            Ok((MigrationDirection::Up, steps))
        } else {
            let steps = self
                .steps
                .iter()
                .rev()
                .filter(|step| step.version <= from && step.version > to)
                .collect();
            Ok((MigrationDirection::Down, steps))
        }
    }
}

/// Renders a dependency for registry errors.
fn describe_dependency(depends_on: Option<u32>) -> String {
    depends_on.map_or_else(|| "nothing".to_string(), |version| format!("version {version}"))
}
