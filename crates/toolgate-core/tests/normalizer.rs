// crates/toolgate-core/tests/normalizer.rs
// ============================================================================
// Module: Tool Normalizer Tests
// Description: Tests for id resolution, slug rules, and collision suffixes.
// Purpose: Validate that normalization is total and names stay unique.
// Dependencies: toolgate-core, serde_json
// ============================================================================
//! ## Overview
//! Exercises the normalizer against well-formed, sparse, and colliding
//! descriptors.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;

use serde_json::Value;
use serde_json::json;
use toolgate_core::NormalizerOptions;
use toolgate_core::RawToolDescriptor;
use toolgate_core::RepairKind;
use toolgate_core::ToolNormalizer;
use toolgate_core::normalize;
use toolgate_core::slugify;

fn descriptor(value: Value) -> RawToolDescriptor {
    RawToolDescriptor::from_json(value)
}

fn names(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[test]
fn well_formed_descriptor_scenario() {
    let raw = descriptor(json!({
        "id": "d8ec30f6edcc4f54b9ac5ba3aa73534e",
        "originalName": "context7",
        "url": "https://example.invalid/mcp?api_key=secret",
        "name": "smithery-ai-context7-tool",
        "inputSchema": {},
        "annotations": {},
    }));
    let normalized = normalize(&raw, &BTreeSet::new());
    let tool = &normalized.tool;
    assert_eq!(tool.id().as_str(), "d8ec30f6edcc4f54b9ac5ba3aa73534e");
    assert_eq!(tool.name().as_str(), "smithery-ai-context7-tool");
    assert_eq!(
        tool.input_schema().to_value(),
        json!({"type": "object", "properties": {}, "required": []})
    );
    assert!(tool.annotations().is_empty());
    assert_eq!(tool.url(), "https://example.invalid/mcp?api_key=secret");
    assert!(!normalized.log.contains(RepairKind::SlugifiedName));
    assert!(!normalized.log.contains(RepairKind::RegeneratedId));
}

#[test]
fn null_annotations_become_empty_object_and_serialize() {
    let raw = descriptor(json!({"id": "a1", "name": "search", "annotations": null}));
    let normalized = normalize(&raw, &BTreeSet::new());
    assert!(normalized.tool.annotations().is_empty());
    let value = serde_json::to_value(&normalized.tool).unwrap();
    assert_eq!(value["annotations"], json!({}));
    assert_eq!(value["inputSchema"]["type"], json!("object"));
    assert_eq!(value["description"], json!(""));
    assert!(value.get("originalName").is_some());
}

#[test]
fn canonical_tool_round_trips_through_json() {
    let raw = descriptor(json!({
        "id": "a1",
        "name": "Fetch URL",
        "description": "fetch a page",
        "inputSchema": {"properties": {"url": {"type": "string"}}, "required": ["url"]},
    }));
    let tool = normalize(&raw, &BTreeSet::new()).tool;
    let decoded: toolgate_core::CanonicalTool =
        serde_json::from_value(serde_json::to_value(&tool).unwrap()).unwrap();
    assert_eq!(decoded, tool);
}

#[test]
fn descriptor_decoding_is_lenient() {
    let raw = descriptor(json!({
        "id": 42,
        "name": null,
        "original_name": "legacy",
        "description": ["not", "text"],
        "input_schema": {"type": "object"},
    }));
    assert_eq!(raw.id, "42");
    assert_eq!(raw.name, "");
    assert_eq!(raw.original_name, "legacy");
    assert_eq!(raw.description, None);
    assert_eq!(raw.input_schema, json!({"type": "object"}));
    assert_eq!(descriptor(json!("nope")), RawToolDescriptor::default());
}

#[test]
fn slugify_rules() {
    assert_eq!(slugify("Smithery AI / Context7 Tool"), "smithery-ai-context7-tool");
    assert_eq!(slugify("--leading__and  trailing--"), "leading-and-trailing");
    assert_eq!(slugify("UPPER_case.v2"), "upper-case-v2");
    assert_eq!(slugify("caf\u{e9} m\u{fc}nchen"), "caf-m-nchen");
    assert_eq!(slugify("!!!"), "");
    assert_eq!(slugify(""), "");
}

#[test]
fn name_falls_back_to_original_name_then_default() {
    let from_original = normalize(
        &descriptor(json!({"id": "a", "name": "***", "originalName": "Read File"})),
        &BTreeSet::new(),
    );
    assert_eq!(from_original.tool.name().as_str(), "read-file");
    assert!(from_original.log.contains(RepairKind::SlugifiedName));

    let fallback = normalize(&descriptor(json!({"id": "b"})), &BTreeSet::new());
    assert_eq!(fallback.tool.name().as_str(), "tool");
}

#[test]
fn long_names_are_truncated_before_suffix() {
    let options = NormalizerOptions {
        suffix_len: 6,
        max_name_len: 10,
    };
    let normalizer = ToolNormalizer::new(options);
    let raw = descriptor(json!({"id": "x", "name": "abcdefghi-jklmnop"}));
    let first = normalizer.normalize(&raw, &BTreeSet::new());
    assert_eq!(first.tool.name().as_str(), "abcdefghi");
    assert!(first.tool.name().is_canonical());

    let second = normalizer.normalize(&raw, &names(&["abcdefghi"]));
    assert!(second.tool.name().as_str().starts_with("abcdefghi-"));
    assert_eq!(second.tool.name().as_str().len(), "abcdefghi-".len() + 6);
}

#[test]
fn missing_or_reserved_ids_are_regenerated() {
    let empty = normalize(&descriptor(json!({"name": "a", "id": "   "})), &BTreeSet::new());
    assert_eq!(empty.tool.id().as_str().len(), 32);
    assert!(empty.tool.id().as_str().bytes().all(|byte| byte.is_ascii_hexdigit()));
    assert!(empty.log.contains(RepairKind::RegeneratedId));

    let trimmed = normalize(&descriptor(json!({"name": "a", "id": " abc "})), &BTreeSet::new());
    assert_eq!(trimmed.tool.id().as_str(), "abc");

    let reserved = ToolNormalizer::default().normalize_reserving(
        &descriptor(json!({"name": "a", "id": "abc"})),
        &BTreeSet::new(),
        &names(&["abc"]),
    );
    assert_ne!(reserved.tool.id().as_str(), "abc");
    let event = reserved
        .log
        .events()
        .iter()
        .find(|event| event.kind == RepairKind::RegeneratedId)
        .unwrap();
    assert_eq!(event.detail.as_deref(), Some("reserved"));
}

#[test]
fn identical_names_yield_distinct_names() {
    let first_raw = descriptor(json!({"id": "one", "name": "search", "originalName": "alpha"}));
    let second_raw = descriptor(json!({"id": "two", "name": "search", "originalName": "beta"}));
    let first = normalize(&first_raw, &BTreeSet::new());
    let taken = names(&[first.tool.name().as_str()]);
    let second = normalize(&second_raw, &taken);

    assert_ne!(first.tool.name(), second.tool.name());
    assert_eq!(first.tool.name().as_str(), "search");
    assert!(second.tool.name().as_str().starts_with("search-"));
    assert!(second.tool.name().is_canonical());
    assert!(second.log.contains(RepairKind::DisambiguatedName));
    assert_eq!(second.tool.original_name(), "beta");
    assert_eq!(second.tool.id().as_str(), "two");
}

#[test]
fn suffix_is_stable_for_the_same_id() {
    let raw = descriptor(json!({"id": "stable", "name": "search"}));
    let taken = names(&["search"]);
    let first = normalize(&raw, &taken);
    let second = normalize(&raw, &taken);
    assert_eq!(first.tool.name(), second.tool.name());
}

#[test]
fn suffix_grows_until_unique() {
    let raw = descriptor(json!({"id": "grow", "name": "search"}));
    let mut taken = names(&["search"]);
    let mut lengths = Vec::new();
    for _ in 0 .. 5 {
        let normalized = normalize(&raw, &taken);
        let name = normalized.tool.name().as_str().to_string();
        assert!(name.starts_with("search-"));
        assert!(taken.insert(name.clone()), "name repeated: {name}");
        lengths.push(name.len() - "search-".len());
    }
    assert_eq!(lengths, vec![6, 7, 8, 9, 10]);
}

#[test]
fn suffix_counter_applies_after_digest_is_exhausted() {
    let raw = descriptor(json!({"id": "counter", "name": "search"}));
    let normalizer = ToolNormalizer::new(NormalizerOptions {
        suffix_len: 64,
        max_name_len: 128,
    });
    let first = normalizer.normalize(&raw, &names(&["search"]));
    let full = first.tool.name().as_str().to_string();
    assert_eq!(full.len(), "search-".len() + 64);

    let second = normalizer.normalize(&raw, &names(&["search", full.as_str()]));
    assert_eq!(second.tool.name().as_str(), format!("{full}-2"));
}
