//! Config validation tests for toolgate-config.
// crates/toolgate-config/tests/config_validation.rs
// =============================================================================
// Module: Config Validation Tests
// Description: Validate config loading guards and section rules.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use toolgate_config::AuditSinkKind;
use toolgate_config::ConfigError;
use toolgate_config::ToolgateConfig;
use toolgate_store_sqlite::SqliteStoreMode;
use toolgate_store_sqlite::SqliteSyncMode;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<ToolgateConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

fn ensure(condition: bool, message: &str) -> TestResult {
    if condition { Ok(()) } else { Err(message.to_string()) }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(ToolgateConfig::load(Some(Path::new(&long_path))), "exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        ToolgateConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(ToolgateConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(ToolgateConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    match ToolgateConfig::load(Some(Path::new("does/not/exist/toolgate.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {}", describe(&other))),
    }
}

#[test]
fn load_reads_full_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(
        br#"
[database]
connection_string = "sqlite://var/toolgate.db"
busy_timeout_ms = 2500
journal_mode = "delete"
sync_mode = "normal"
read_pool_size = 2

[migrations]
script_location = "out/sql"
lock_holder = "deploy-1"

[ingest]
max_name_attempts = 4
suffix_len = 8
max_name_len = 64
max_batch_bytes = 1024

[audit]
sink = "none"
"#,
    )
    .map_err(|err| err.to_string())?;
    let config = ToolgateConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let store = config.database.store_config().map_err(|err| err.to_string())?;
    ensure(store.path == PathBuf::from("var/toolgate.db"), "sqlite path")?;
    ensure(store.busy_timeout_ms == 2500, "busy timeout")?;
    ensure(store.journal_mode == SqliteStoreMode::Delete, "journal mode")?;
    ensure(store.sync_mode == SqliteSyncMode::Normal, "sync mode")?;
    ensure(store.read_pool_size == 2, "read pool size")?;
    ensure(config.migrations.script_location == PathBuf::from("out/sql"), "script location")?;
    ensure(config.migrations.lock_holder == "deploy-1", "lock holder")?;
    let options = config.ingest.ingest_options();
    ensure(options.max_name_attempts == 4, "attempts")?;
    ensure(options.normalizer.suffix_len == 8, "suffix length")?;
    ensure(options.normalizer.max_name_len == 64, "max name length")?;
    ensure(config.ingest.max_batch_bytes == 1024, "batch bytes")?;
    ensure(config.audit.sink == AuditSinkKind::None, "audit sink")
}

// ============================================================================
// SECTION: Sections
// ============================================================================

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let config = ToolgateConfig::from_toml("").map_err(|err| err.to_string())?;
    ensure(config == ToolgateConfig::default(), "defaults")?;
    let path = config.database.sqlite_path().map_err(|err| err.to_string())?;
    ensure(path == PathBuf::from("toolgate.db"), "default database path")?;
    ensure(config.migrations.lock_holder == "toolgate", "default lock holder")?;
    ensure(config.ingest.max_name_attempts == 8, "default attempts")?;
    ensure(config.audit.sink == AuditSinkKind::Stderr, "default sink")
}

#[test]
fn camel_case_aliases_are_accepted() -> TestResult {
    let config = ToolgateConfig::from_toml(
        "[database]\nconnectionString = \"catalog.db\"\n[migrations]\nscriptLocation = \"sql\"\n",
    )
    .map_err(|err| err.to_string())?;
    let path = config.database.sqlite_path().map_err(|err| err.to_string())?;
    ensure(path == PathBuf::from("catalog.db"), "bare path accepted")?;
    ensure(config.migrations.script_location == PathBuf::from("sql"), "script location alias")
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    let cases = [
        ("[database]\nconection_string = \"sqlite:///srv/catalog.db\"\n", "conection_string"),
        ("[migratons]\nlock_holder = \"deploy\"\n", "migratons"),
        ("[migrations]\nscript_dir = \"sql\"\n", "script_dir"),
        ("[ingest]\nmax_attempts = 3\n", "max_attempts"),
        ("[audit]\nsink = \"none\"\nformat = \"json\"\n", "format"),
    ];
    for (text, key) in cases {
        match ToolgateConfig::from_toml(text) {
            Err(ConfigError::Parse(message)) => {
                ensure(message.contains(key), &format!("error {message} should name {key}"))?;
            }
            other => {
                return Err(format!("expected parse error for {key}, got {}", describe(&other)));
            }
        }
    }
    Ok(())
}

#[test]
fn non_sqlite_scheme_is_rejected() -> TestResult {
    assert_invalid(
        ToolgateConfig::from_toml("[database]\nconnection_string = \"postgres://db/catalog\"\n"),
        "sqlite:// scheme",
    )?;
    assert_invalid(
        ToolgateConfig::from_toml("[database]\nconnection_string = \"sqlite://\"\n"),
        "must be non-empty",
    )
}

#[test]
fn out_of_range_ingest_values_are_rejected() -> TestResult {
    assert_invalid(
        ToolgateConfig::from_toml("[ingest]\nmax_name_attempts = 0\n"),
        "ingest.max_name_attempts",
    )?;
    assert_invalid(ToolgateConfig::from_toml("[ingest]\nsuffix_len = 65\n"), "ingest.suffix_len")?;
    assert_invalid(
        ToolgateConfig::from_toml("[ingest]\nmax_name_len = 161\n"),
        "ingest.max_name_len",
    )?;
    assert_invalid(
        ToolgateConfig::from_toml("[database]\nread_pool_size = 0\n"),
        "database.read_pool_size",
    )
}

#[test]
fn blank_lock_holder_is_rejected() -> TestResult {
    assert_invalid(
        ToolgateConfig::from_toml("[migrations]\nlock_holder = \"  \"\n"),
        "migrations.lock_holder",
    )
}

#[test]
fn audit_path_rules() -> TestResult {
    assert_invalid(ToolgateConfig::from_toml("[audit]\nsink = \"file\"\n"), "requires audit.path")?;
    assert_invalid(
        ToolgateConfig::from_toml("[audit]\nsink = \"stderr\"\npath = \"audit.jsonl\"\n"),
        "only valid for the file audit sink",
    )?;
    match ToolgateConfig::from_toml("[audit]\nsink = \"syslog\"\n") {
        Err(ConfigError::Parse(_)) => {}
        other => return Err(format!("expected parse error, got {}", describe(&other))),
    }

    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let log = dir.path().join("audit.jsonl");
    let text = format!("[audit]\nsink = \"file\"\npath = '{}'\n", log.display());
    let config = ToolgateConfig::from_toml(&text).map_err(|err| err.to_string())?;
    config.audit.build_sink().map_err(|err| err.to_string())?;
    ensure(log.exists(), "file sink creates the log")
}

fn describe(result: &Result<ToolgateConfig, ConfigError>) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(error) => error.to_string(),
    }
}
