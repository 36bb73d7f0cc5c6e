// crates/toolgate-core/src/audit.rs
// ============================================================================
// Module: Toolgate Audit Logging
// Description: Structured audit events for ingestion and schema migrations.
// Purpose: Emit redacted JSON-line audit records without hard dependencies.
// Dependencies: crate::core, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events record every descriptor outcome (with its repair log) and
//! every migration step. Sinks are deliberately small so that deployments can
//! route events to their preferred logging pipeline.
//!
//! Security posture: events never carry upstream URLs or raw schema payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::RepairEvent;
use crate::core::RepairLog;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome label for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation completed.
    Accepted,
    /// Operation failed.
    Failed,
}

/// Tool ingestion audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolIngestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Canonical tool identifier when normalization completed.
    pub tool_id: Option<String>,
    /// Canonical tool name when normalization completed.
    pub tool_name: Option<String>,
    /// Producer's original tool name.
    pub original_name: String,
    /// Ingestion outcome.
    pub outcome: AuditOutcome,
    /// Number of normalize/put attempts.
    pub attempts: usize,
    /// Repairs applied to the descriptor.
    pub repairs: Vec<RepairEvent>,
    /// Error message when the outcome is a failure.
    pub error: Option<String>,
}

impl ToolIngestAuditEvent {
    /// Creates an event for a stored tool.
    #[must_use]
    pub fn accepted(
        tool_id: &str,
        tool_name: &str,
        original_name: &str,
        attempts: usize,
        repairs: &RepairLog,
    ) -> Self {
        Self {
            event: "tool_ingest",
            timestamp_ms: now_millis(),
            tool_id: Some(tool_id.to_string()),
            tool_name: Some(tool_name.to_string()),
            original_name: original_name.to_string(),
            outcome: AuditOutcome::Accepted,
            attempts,
            repairs: repairs.events().to_vec(),
            error: None,
        }
    }

    /// Creates an event for a descriptor that could not be stored.
    #[must_use]
    pub fn failed(
        original_name: &str,
        attempts: usize,
        repairs: &RepairLog,
        error: String,
    ) -> Self {
        Self {
            event: "tool_ingest",
            timestamp_ms: now_millis(),
            tool_id: None,
            tool_name: None,
            original_name: original_name.to_string(),
            outcome: AuditOutcome::Failed,
            attempts,
            repairs: repairs.events().to_vec(),
            error: Some(error),
        }
    }
}

/// Schema migration audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Migration step version.
    pub version: u32,
    /// Migration step name.
    pub name: String,
    /// Direction label (`up` or `down`).
    pub direction: String,
    /// Recorded schema version after the step.
    pub resulting_version: u32,
    /// Step outcome.
    pub outcome: AuditOutcome,
    /// Error message when the step failed.
    pub error: Option<String>,
}

/// Inputs required to construct a migration audit event.
pub struct MigrationAuditEventParams {
    /// Migration step version.
    pub version: u32,
    /// Migration step name.
    pub name: String,
    /// Direction label.
    pub direction: String,
    /// Recorded schema version after the step.
    pub resulting_version: u32,
    /// Step outcome.
    pub outcome: AuditOutcome,
    /// Error message when the step failed.
    pub error: Option<String>,
}

impl MigrationAuditEvent {
    /// Creates a new migration audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: MigrationAuditEventParams) -> Self {
        Self {
            event: "schema_migration",
            timestamp_ms: now_millis(),
            version: params.version,
            name: params.name,
            direction: params.direction,
            resulting_version: params.resulting_version,
            outcome: params.outcome,
            error: params.error,
        }
    }
}

/// Returns the current unix epoch in milliseconds.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for ingestion and migration events.
pub trait AuditSink: Send + Sync {
    /// Record a tool ingestion event.
    fn record_ingest(&self, event: &ToolIngestAuditEvent);

    /// Record a schema migration event.
    fn record_migration(&self, _event: &MigrationAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record_ingest(&self, event: &ToolIngestAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_migration(&self, event: &MigrationAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends a serialized payload as one line.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_ingest(&self, event: &ToolIngestAuditEvent) {
        self.append(event);
    }

    fn record_migration(&self, event: &MigrationAuditEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_ingest(&self, _event: &ToolIngestAuditEvent) {}

    fn record_migration(&self, _event: &MigrationAuditEvent) {}
}

/// Audit sink that retains events in memory for inspection.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded ingestion events.
    ingest: Mutex<Vec<ToolIngestAuditEvent>>,
    /// Recorded migration events.
    migrations: Mutex<Vec<MigrationAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded ingestion events.
    #[must_use]
    pub fn ingest_events(&self) -> Vec<ToolIngestAuditEvent> {
        self.ingest.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns a snapshot of recorded migration events.
    #[must_use]
    pub fn migration_events(&self) -> Vec<MigrationAuditEvent> {
        self.migrations.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_ingest(&self, event: &ToolIngestAuditEvent) {
        if let Ok(mut guard) = self.ingest.lock() {
            guard.push(event.clone());
        }
    }

    fn record_migration(&self, event: &MigrationAuditEvent) {
        if let Ok(mut guard) = self.migrations.lock() {
            guard.push(event.clone());
        }
    }
}
