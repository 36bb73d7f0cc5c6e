// crates/toolgate-core/src/runtime/ingest.rs
// ============================================================================
// Module: Catalog Ingestion Pipeline
// Description: Normalize-and-store loop with bounded name conflict recovery.
// Purpose: Move raw descriptor batches into a catalog store with auditing.
// Dependencies: crate::{audit, core, interfaces, runtime}, serde_json, tracing
// ============================================================================

//! ## Overview
//! The ingestor keeps an in-process set of names in use. The set is only a
//! hint: when the store reports [`StoreError::NameConflict`] the conflicting
//! name joins the hint and the descriptor is normalized again, up to
//! [`IngestOptions::max_name_attempts`] times. Tombstoned ids reported by the
//! store are reserved and regenerated the same way. Any other store error
//! fails that descriptor without a retry.
//!
//! Re-ingesting a descriptor whose id is already stored replaces the record
//! and keeps its current name unless the slug changed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Value;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::ToolIngestAuditEvent;
use crate::core::MAX_TOOL_ID_LENGTH;
use crate::core::RawToolDescriptor;
use crate::core::RepairLog;
use crate::core::ToolId;
use crate::interfaces::CatalogStore;
use crate::interfaces::StoreError;
use crate::runtime::cancel::CancelToken;
use crate::runtime::normalizer::NormalizedTool;
use crate::runtime::normalizer::NormalizerOptions;
use crate::runtime::normalizer::ToolNormalizer;

// ============================================================================
// SECTION: Options and Errors
// ============================================================================

/// Default bound on normalize/put attempts per descriptor.
pub const DEFAULT_MAX_NAME_ATTEMPTS: usize = 8;

/// Ingestion tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Maximum normalize/put attempts per descriptor.
    pub max_name_attempts: usize,
    /// Normalizer tunables.
    pub normalizer: NormalizerOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
            normalizer: NormalizerOptions::default(),
        }
    }
}

/// Ingestion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// Input was not a descriptor object or an array of them.
    #[error("invalid ingest input: {0}")]
    InvalidInput(String),
    /// Store failed with a non-recoverable error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Name or id conflicts persisted across every attempt.
    #[error("gave up after {attempts} conflicting attempts")]
    NameAttemptsExhausted {
        /// Attempts made.
        attempts: usize,
    },
}

/// A descriptor that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    /// Position of the descriptor in the batch.
    pub index: usize,
    /// Producer id as reported (possibly empty).
    pub raw_id: String,
    /// Producer's original name.
    pub original_name: String,
    /// Failure reason.
    pub error: IngestError,
}

/// Outcome of a batch ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Stored tools with their repair logs, in batch order.
    pub accepted: Vec<NormalizedTool>,
    /// Descriptors that failed.
    pub failures: Vec<IngestFailure>,
    /// Descriptors not attempted because the batch was cancelled.
    pub skipped: usize,
    /// True when cancellation stopped the batch early.
    pub cancelled: bool,
}

impl IngestReport {
    /// Returns true when every descriptor was stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

// ============================================================================
// SECTION: Input Decoding
// ============================================================================

/// Decodes a JSON array (or a single object) into raw descriptors.
///
/// Array elements that are not objects decode to empty descriptors and are
/// defaulted by normalization.
///
/// # Errors
///
/// Returns [`IngestError::InvalidInput`] when the value is neither an array
/// nor an object.
pub fn parse_descriptors(value: Value) -> Result<Vec<RawToolDescriptor>, IngestError> {
    match value {
        Value::Array(items) => Ok(items.into_iter().map(RawToolDescriptor::from_json).collect()),
        Value::Object(_) => Ok(vec![RawToolDescriptor::from_json(value)]),
        _ => Err(IngestError::InvalidInput(
            "expected a descriptor object or an array of descriptors".to_string(),
        )),
    }
}

// ============================================================================
// SECTION: Ingestor
// ============================================================================

/// Drives raw descriptors through normalization into a catalog store.
pub struct CatalogIngestor<S> {
    /// Backing catalog store.
    store: Arc<S>,
    /// Audit sink for per-descriptor outcomes.
    audit: Arc<dyn AuditSink>,
    /// Descriptor normalizer.
    normalizer: ToolNormalizer,
    /// Maximum normalize/put attempts per descriptor.
    max_name_attempts: usize,
    /// Names believed to be in use.
    name_hint: Mutex<BTreeSet<String>>,
}

impl<S: CatalogStore> CatalogIngestor<S> {
    /// Creates an ingestor with an empty name hint.
    #[must_use]
    pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>, options: IngestOptions) -> Self {
        Self {
            store,
            audit,
            normalizer: ToolNormalizer::new(options.normalizer),
            max_name_attempts: options.max_name_attempts.max(1),
            name_hint: Mutex::new(BTreeSet::new()),
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Seeds the name hint from the store and returns the number of names.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] when listing fails.
    pub fn warm_hint(&self) -> Result<usize, IngestError> {
        let names: BTreeSet<String> =
            self.store.list()?.iter().map(|tool| tool.name().as_str().to_string()).collect();
        let count = names.len();
        self.lock_hint()?.extend(names);
        Ok(count)
    }

    /// Normalizes and stores one descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when the store fails or conflicts persist.
    pub fn ingest_one(&self, raw: &RawToolDescriptor) -> Result<NormalizedTool, IngestError> {
        let mut reserved = BTreeSet::new();
        self.ingest_reserving(raw, &mut reserved)
    }

    /// Ingests a batch, stopping between descriptors once `cancel` fires.
    ///
    /// Ids used earlier in the batch are reserved, so a duplicate producer id
    /// later in the batch receives a fresh identifier rather than overwriting
    /// its sibling.
    pub fn ingest_batch(&self, raws: &[RawToolDescriptor], cancel: &CancelToken) -> IngestReport {
        let mut report = IngestReport::default();
        let mut reserved = BTreeSet::new();
        for (index, raw) in raws.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.skipped = raws.len() - index;
                tracing::info!(skipped = report.skipped, "ingest batch cancelled");
                break;
            }
            match self.ingest_reserving(raw, &mut reserved) {
                Ok(normalized) => {
                    reserved.insert(normalized.tool.id().as_str().to_string());
                    report.accepted.push(normalized);
                }
                Err(error) => report.failures.push(IngestFailure {
                    index,
                    raw_id: raw.id.clone(),
                    original_name: raw.original_name.clone(),
                    error,
                }),
            }
        }
        tracing::info!(
            accepted = report.accepted.len(),
            failed = report.failures.len(),
            "ingest batch finished"
        );
        report
    }

    /// Runs the bounded normalize/put loop for one descriptor.
    fn ingest_reserving(
        &self,
        raw: &RawToolDescriptor,
        reserved: &mut BTreeSet<String>,
    ) -> Result<NormalizedTool, IngestError> {
        let mut last_log = RepairLog::new();
        for attempt in 1 ..= self.max_name_attempts {
            let (normalized, previous_name) = match self.attempt(raw, reserved) {
                Ok(attempted) => attempted,
                Err(error) => return Err(self.fail(raw, attempt, &last_log, error)),
            };
            match self.store.put(&normalized.tool) {
                Ok(()) => {
                    self.remember(&normalized, previous_name.as_deref())?;
                    self.audit.record_ingest(&ToolIngestAuditEvent::accepted(
                        normalized.tool.id().as_str(),
                        normalized.tool.name().as_str(),
                        normalized.tool.original_name(),
                        attempt,
                        &normalized.log,
                    ));
                    return Ok(normalized);
                }
                Err(StoreError::NameConflict {
                    name,
                }) => {
                    tracing::debug!(name = %name, attempt, "tool name taken, retrying");
                    self.lock_hint()?.insert(name);
                }
                Err(StoreError::IdRetired {
                    id,
                }) => {
                    tracing::debug!(id = %id, attempt, "tool id retired, regenerating");
                    reserved.insert(id);
                }
                Err(error) => {
                    return Err(self.fail(raw, attempt, &normalized.log, error.into()));
                }
            }
            last_log = normalized.log;
        }
        let error = IngestError::NameAttemptsExhausted {
            attempts: self.max_name_attempts,
        };
        Err(self.fail(raw, self.max_name_attempts, &last_log, error))
    }

    /// Normalizes against the current hint, ignoring the name held by the
    /// stored record with the same id. Returns that previous name, if any.
    fn attempt(
        &self,
        raw: &RawToolDescriptor,
        reserved: &BTreeSet<String>,
    ) -> Result<(NormalizedTool, Option<String>), IngestError> {
        let mut names = self.lock_hint()?.clone();
        let raw_id = raw.id.trim();
        let mut previous_name = None;
        if !raw_id.is_empty()
            && raw_id.len() <= MAX_TOOL_ID_LENGTH
            && !reserved.contains(raw_id)
            && let Some(previous) = self.store.get_by_id(&ToolId::new(raw_id))?
        {
            names.remove(previous.name().as_str());
            previous_name = Some(previous.name().as_str().to_string());
        }
        let normalized = self.normalizer.normalize_reserving(raw, &names, reserved);
        Ok((normalized, previous_name))
    }

    /// Records the stored name in the hint and drops a name the upsert released.
    fn remember(
        &self,
        normalized: &NormalizedTool,
        previous_name: Option<&str>,
    ) -> Result<(), IngestError> {
        let stored = normalized.tool.name().as_str();
        let mut hint = self.lock_hint()?;
        if let Some(previous) = previous_name
            && previous != stored
        {
            hint.remove(previous);
        }
        hint.insert(stored.to_string());
        Ok(())
    }

    /// Emits a failure audit event and returns the error.
    fn fail(
        &self,
        raw: &RawToolDescriptor,
        attempts: usize,
        log: &RepairLog,
        error: IngestError,
    ) -> IngestError {
        tracing::warn!(attempts, error = %error, "tool descriptor rejected");
        self.audit.record_ingest(&ToolIngestAuditEvent::failed(
            &raw.original_name,
            attempts,
            log,
            error.to_string(),
        ));
        error
    }

    /// Locks the name hint.
    fn lock_hint(&self) -> Result<MutexGuard<'_, BTreeSet<String>>, IngestError> {
        self.name_hint
            .lock()
            .map_err(|_| IngestError::Store(StoreError::Io("name hint mutex poisoned".to_string())))
    }
}
