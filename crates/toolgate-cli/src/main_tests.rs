// crates/toolgate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing, bounded reads, and dispatch.
// Purpose: Ensure CLI inputs fail closed and commands reach the engine.
// Dependencies: toolgate-cli main helpers, tempfile
// ============================================================================

//! ## Overview
//! Validates `read_bytes_with_limit`, clap argument rules, output formatting,
//! and an end-to-end migrate plus ingest run against a temporary database.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tempfile::TempDir;
use toolgate_core::CatalogStore;
use toolgate_core::IngestError;
use toolgate_core::IngestFailure;
use toolgate_core::IngestReport;
use toolgate_core::ToolName;
use toolgate_store_sqlite::OnlineOutcome;
use toolgate_store_sqlite::SqliteCatalogStore;
use toolgate_store_sqlite::SqliteStoreConfig;

use super::CatalogCommand;
use super::Cli;
use super::Commands;
use super::MigrateCommand;
use super::ReadLimitError;
use super::outcome_message;
use super::read_bytes_with_limit;
use super::report_lines;
use super::run;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

fn write_config(dir: &TempDir) -> PathBuf {
    let db = dir.path().join("catalog.db");
    let sql = dir.path().join("sql");
    let text = format!(
        "[database]\nconnection_string = 'sqlite://{}'\n\n[migrations]\nscript_location = \
         '{}'\n\n[audit]\nsink = \"none\"\n",
        db.display(),
        sql.display()
    );
    let path = dir.path().join("toolgate.toml");
    fs::write(&path, text).unwrap();
    path
}

fn run_args(config: &Path, rest: &[&str]) -> ExitCode {
    let config = config.display().to_string();
    let mut args = vec!["toolgate", "--config", config.as_str()];
    args.extend_from_slice(rest);
    run(parse(&args)).unwrap()
}

// ============================================================================
// SECTION: Bounded Reads
// ============================================================================

#[test]
fn read_bytes_with_limit_accepts_small_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tools.json");
    fs::write(&path, b"[]").unwrap();
    assert_eq!(read_bytes_with_limit(&path, 8).unwrap(), b"[]".to_vec());
}

#[test]
fn read_bytes_with_limit_rejects_oversized_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tools.json");
    fs::write(&path, vec![b' '; 32]).unwrap();
    match read_bytes_with_limit(&path, 16) {
        Err(ReadLimitError::TooLarge {
            size,
            limit,
        }) => {
            assert_eq!(size, 32);
            assert_eq!(limit, 16);
        }
        other => panic!("expected too large, got {other:?}"),
    }
}

#[test]
fn read_bytes_with_limit_reports_missing_file() {
    let error = read_bytes_with_limit(Path::new("does/not/exist.json"), 16).unwrap_err();
    assert!(matches!(error, ReadLimitError::Io(_)));
    assert!(error.describe(Path::new("x.json")).starts_with("failed to read x.json"));
}

// ============================================================================
// SECTION: Argument Parsing
// ============================================================================

#[test]
fn upgrade_sql_flags_parse() {
    let cli = parse(&["toolgate", "migrate", "upgrade", "--sql", "--from", "1", "--target", "3"]);
    match cli.command {
        Commands::Migrate {
            command: MigrateCommand::Upgrade(args),
        } => {
            assert!(args.sql);
            assert_eq!(args.from, Some(1));
            assert_eq!(args.target, Some(3));
            assert!(!args.write);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn from_requires_sql() {
    assert!(Cli::try_parse_from(["toolgate", "migrate", "upgrade", "--from", "1"]).is_err());
    assert!(Cli::try_parse_from(["toolgate", "migrate", "downgrade"]).is_err());
}

#[test]
fn catalog_get_requires_one_key() {
    assert!(Cli::try_parse_from(["toolgate", "catalog", "get"]).is_err());
    assert!(
        Cli::try_parse_from(["toolgate", "catalog", "get", "--id", "a", "--name", "b"]).is_err()
    );
    let cli = parse(&["toolgate", "catalog", "get", "--name", "search"]);
    assert!(matches!(
        cli.command,
        Commands::Catalog {
            command: CatalogCommand::Get(_),
        }
    ));
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

#[test]
fn outcome_messages() {
    let applied = OnlineOutcome::Applied {
        from: 1,
        to: 4,
        steps: 3,
    };
    assert_eq!(outcome_message(applied), "migrated from version 1 to version 4");
    let idle = OnlineOutcome::NoPendingMigrations {
        version: 4,
    };
    assert_eq!(outcome_message(idle), "no pending migrations");
}

#[test]
fn report_lines_list_failures_and_cancellation() {
    let report = IngestReport {
        accepted: Vec::new(),
        failures: vec![IngestFailure {
            index: 2,
            raw_id: "x".to_string(),
            original_name: "Search".to_string(),
            error: IngestError::NameAttemptsExhausted {
                attempts: 8,
            },
        }],
        skipped: 3,
        cancelled: true,
    };
    assert_eq!(
        report_lines(&report),
        vec![
            "failed #2 Search: gave up after 8 conflicting attempts".to_string(),
            "ingested 0 tools, 1 failed, 3 skipped after cancellation".to_string(),
        ]
    );
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

#[test]
fn migrate_then_ingest_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    assert_eq!(run_args(&config, &["migrate", "upgrade"]), ExitCode::SUCCESS);
    assert_eq!(run_args(&config, &["migrate", "upgrade"]), ExitCode::SUCCESS);
    assert_eq!(run_args(&config, &["migrate", "current"]), ExitCode::SUCCESS);
    assert_eq!(run_args(&config, &["migrate", "history"]), ExitCode::SUCCESS);

    let input = dir.path().join("tools.json");
    fs::write(
        &input,
        r#"[{"id": "a", "name": "Web Search"}, {"id": "b", "name": "web_search"}]"#,
    )
    .unwrap();
    let file = input.display().to_string();
    assert_eq!(run_args(&config, &["catalog", "ingest", file.as_str()]), ExitCode::SUCCESS);

    let store =
        SqliteCatalogStore::open(SqliteStoreConfig::new(dir.path().join("catalog.db"))).unwrap();
    let tools = store.list().unwrap();
    assert_eq!(tools.len(), 2);
    assert!(store.get_by_name(&ToolName::new("web-search")).unwrap().is_some());

    assert_eq!(run_args(&config, &["catalog", "delete", "--id", "a"]), ExitCode::SUCCESS);
    assert_eq!(store.list().unwrap().len(), 1);
    assert!(run(parse(&[
        "toolgate",
        "--config",
        config.display().to_string().as_str(),
        "catalog",
        "get",
        "--id",
        "a",
    ]))
    .is_err());
}

#[test]
fn offline_write_emits_script_files() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let code = run_args(&config, &["migrate", "upgrade", "--sql", "--target", "3", "--write"]);
    assert_eq!(code, ExitCode::SUCCESS);
    let mut names: Vec<String> = fs::read_dir(dir.path().join("sql"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 4);
    assert_eq!(names[0], "0000_bookkeeping.sql");
    assert!(!dir.path().join("catalog.db").exists());
}

#[test]
fn online_only_step_fails_offline() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let config = config.display().to_string();
    let args = ["toolgate", "--config", config.as_str(), "migrate", "upgrade", "--sql"];
    assert!(run(parse(&args)).is_err());
}
