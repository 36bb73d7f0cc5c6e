// crates/toolgate-core/src/runtime/cancel.rs
// ============================================================================
// Module: Cancellation
// Description: Shared cancellation flag for batch ingestion and migrations.
// Purpose: Let callers stop long-running work between units of work.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`CancelToken`] is checked between descriptors during ingestion and
//! before each migration step commits. Work that already committed stays
//! committed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

// ============================================================================
// SECTION: Cancel Token
// ============================================================================

/// Cloneable cancellation flag shared between a controller and workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Shared flag; set once, never cleared.
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation for every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
