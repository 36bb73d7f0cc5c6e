// crates/toolgate-core/src/runtime/normalizer.rs
// ============================================================================
// Module: Tool Normalizer
// Description: Canonicalizes raw descriptors into immutable catalog records.
// Purpose: Assign stable ids and unique slugs, then repair schemas.
// Dependencies: crate::core, serde, tracing
// ============================================================================

//! ## Overview
//! Normalization is a pure function of the descriptor, the caller's view of
//! names already in use, and identifiers that may not be reused. It never
//! fails. The name set is a hint only: the catalog store decides uniqueness,
//! and the ingestion pipeline re-runs normalization when the hint was stale.
//!
//! Collision suffixes are derived from the SHA-256 digest of the tool id, so
//! the same tool receives the same suffix on every ingestion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::CanonicalTool;
use crate::core::CanonicalToolParams;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::MAX_TOOL_ID_LENGTH;
use crate::core::RawToolDescriptor;
use crate::core::RepairKind;
use crate::core::RepairLog;
use crate::core::ToolId;
use crate::core::ToolName;
use crate::core::hashing::hash_bytes;
use crate::core::repair_annotations;
use crate::core::repair_input_schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of digest characters in a collision suffix.
pub const DEFAULT_SUFFIX_LEN: usize = 6;
/// Default maximum slug length before a suffix is appended.
pub const DEFAULT_MAX_NAME_LEN: usize = 128;
/// Upper bound for configured slug lengths.
///
/// Leaves room for the full digest and a counter within
/// [`crate::MAX_TOOL_NAME_LENGTH`].
pub const MAX_SLUG_LENGTH: usize = 160;
/// Slug used when neither the display name nor the original name yields one.
pub const FALLBACK_TOOL_NAME: &str = "tool";

/// Field label used for identifier events.
const ID_FIELD: &str = "id";
/// Field label used for name events.
const NAME_FIELD: &str = "name";
/// Hex length of a SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Tunables for the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    /// Initial number of digest characters in a collision suffix (1..=64).
    pub suffix_len: usize,
    /// Maximum slug length before a suffix is appended.
    pub max_name_len: usize,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            suffix_len: DEFAULT_SUFFIX_LEN,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

// ============================================================================
// SECTION: Normalizer
// ============================================================================

/// Normalized tool together with every repair applied to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTool {
    /// Canonical record ready for storage.
    pub tool: CanonicalTool,
    /// Ordered repair log (id, name, schema, annotations).
    pub log: RepairLog,
}

/// Canonicalizes raw descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolNormalizer {
    /// Normalizer tunables.
    options: NormalizerOptions,
}

impl ToolNormalizer {
    /// Creates a normalizer with the given options.
    #[must_use]
    pub const fn new(options: NormalizerOptions) -> Self {
        Self {
            options,
        }
    }

    /// Returns the configured options.
    #[must_use]
    pub const fn options(&self) -> NormalizerOptions {
        self.options
    }

    /// Normalizes a descriptor against the names currently in use.
    #[must_use]
    pub fn normalize(
        &self,
        raw: &RawToolDescriptor,
        existing_names: &BTreeSet<String>,
    ) -> NormalizedTool {
        self.normalize_reserving(raw, existing_names, &BTreeSet::new())
    }

    /// Normalizes a descriptor, regenerating its id when the id is reserved.
    ///
    /// Reserved ids are those already used earlier in the same batch and
    /// tombstoned ids reported by the store.
    #[must_use]
    pub fn normalize_reserving(
        &self,
        raw: &RawToolDescriptor,
        existing_names: &BTreeSet<String>,
        reserved_ids: &BTreeSet<String>,
    ) -> NormalizedTool {
        let mut log = RepairLog::new();
        let id = resolve_id(&raw.id, reserved_ids, &mut log);
        let name = self.resolve_name(raw, &id, existing_names, &mut log);
        let (input_schema, schema_log) = repair_input_schema(&raw.input_schema);
        log.extend(schema_log);
        let (annotations, annotations_log) = repair_annotations(&raw.annotations);
        log.extend(annotations_log);

        let tool = CanonicalTool::new(CanonicalToolParams {
            id,
            name,
            original_name: raw.original_name.clone(),
            url: raw.url.clone(),
            description: raw.description.clone().unwrap_or_default(),
            input_schema,
            annotations,
        });
        NormalizedTool {
            tool,
            log,
        }
    }

    /// Derives a unique slug for the descriptor.
    fn resolve_name(
        &self,
        raw: &RawToolDescriptor,
        id: &ToolId,
        existing_names: &BTreeSet<String>,
        log: &mut RepairLog,
    ) -> ToolName {
        let max_len = self.options.max_name_len.clamp(1, MAX_SLUG_LENGTH);
        let candidates =
            [(raw.name.as_str(), NAME_FIELD), (raw.original_name.as_str(), "originalName")];
        let (base, source) = candidates
            .into_iter()
            .map(|(value, source)| (truncate_slug(slugify(value), max_len), source))
            .find(|(slug, _)| !slug.is_empty())
            .unwrap_or_else(|| (FALLBACK_TOOL_NAME.to_string(), "default"));
        if base != raw.name {
            log.record(RepairKind::SlugifiedName, NAME_FIELD, Some(source.to_string()));
        }
        if !existing_names.contains(&base) {
            return ToolName::new(base);
        }

        let name = self.disambiguate(&base, id, existing_names);
        tracing::debug!(base = %base, name = %name, "tool name disambiguated");
        log.record(RepairKind::DisambiguatedName, NAME_FIELD, Some(name.clone()));
        ToolName::new(name)
    }

    /// Appends a digest suffix that grows until the name is free.
    fn disambiguate(&self, base: &str, id: &ToolId, existing_names: &BTreeSet<String>) -> String {
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, id.as_str().as_bytes()).value;
        let start = self.options.suffix_len.clamp(1, DIGEST_HEX_LEN);
        for len in start ..= DIGEST_HEX_LEN {
            let candidate = format!("{base}-{}", &digest[.. len]);
            if !existing_names.contains(&candidate) {
                return candidate;
            }
        }
        let mut counter: u64 = 2;
        loop {
            let candidate = format!("{base}-{digest}-{counter}");
            if !existing_names.contains(&candidate) {
                return candidate;
            }
            counter = counter.saturating_add(1);
        }
    }
}

/// Normalizes a descriptor with default options.
#[must_use]
pub fn normalize(raw: &RawToolDescriptor, existing_names: &BTreeSet<String>) -> NormalizedTool {
    ToolNormalizer::default().normalize(raw, existing_names)
}

// ============================================================================
// SECTION: Slugs and Identifiers
// ============================================================================

/// Converts free text into a slug.
///
/// ASCII letters are lowercased and digits kept; every run of other
/// characters becomes a single `-`. Leading and trailing separators are
/// removed, so the result may be empty.
#[must_use]
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// Truncates an ASCII slug and trims any separator left at the cut.
fn truncate_slug(mut slug: String, max_len: usize) -> String {
    if slug.len() > max_len {
        slug.truncate(max_len);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Keeps the producer id when usable; otherwise issues a fresh one.
fn resolve_id(raw_id: &str, reserved_ids: &BTreeSet<String>, log: &mut RepairLog) -> ToolId {
    let trimmed = raw_id.trim();
    let reason = if trimmed.is_empty() {
        "empty"
    } else if trimmed.len() > MAX_TOOL_ID_LENGTH {
        "oversized"
    } else if reserved_ids.contains(trimmed) {
        "reserved"
    } else {
        return ToolId::new(trimmed);
    };
    let mut id = ToolId::generate();
    while reserved_ids.contains(id.as_str()) {
        id = ToolId::generate();
    }
    log.record(RepairKind::RegeneratedId, ID_FIELD, Some(reason.to_string()));
    id
}
