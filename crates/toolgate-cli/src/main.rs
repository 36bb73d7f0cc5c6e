// crates/toolgate-cli/src/main.rs
// ============================================================================
// Module: Toolgate CLI Entry Point
// Description: Command dispatcher for schema migrations and catalog upkeep.
// Purpose: Give operators a safe CLI over the migration engine and store.
// Dependencies: clap, toolgate-config, toolgate-core, toolgate-store-sqlite,
//               tracing-subscriber
// ============================================================================

//! ## Overview
//! `toolgate migrate` moves the catalog database between schema versions,
//! either online against the configured database or offline by rendering
//! reviewable SQL. `toolgate catalog` ingests descriptor files and inspects
//! the stored catalog. Diagnostics go to stderr through `tracing`, filtered by
//! `TOOLGATE_LOG`; command results go to stdout.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgGroup;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use rusqlite::Connection;
use thiserror::Error;
use toolgate_config::CONFIG_ENV_VAR;
use toolgate_config::DEFAULT_CONFIG_NAME;
use toolgate_config::ToolgateConfig;
use toolgate_core::CancelToken;
use toolgate_core::CatalogIngestor;
use toolgate_core::CatalogStore;
use toolgate_core::IngestReport;
use toolgate_core::ToolId;
use toolgate_core::ToolName;
use toolgate_core::parse_descriptors;
use toolgate_store_sqlite::MigrationEngine;
use toolgate_store_sqlite::OfflineScript;
use toolgate_store_sqlite::OnlineOutcome;
use toolgate_store_sqlite::SqliteCatalogStore;
use toolgate_store_sqlite::connect;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding the `tracing` filter directive.
const LOG_ENV_VAR: &str = "TOOLGATE_LOG";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a display message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Toolgate command line.
#[derive(Parser, Debug)]
#[command(name = "toolgate", version, about = "Tool catalog migrations and maintenance")]
struct Cli {
    /// Config file path (defaults to toolgate.toml or `TOOLGATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Schema migration commands.
    Migrate {
        /// Selected migration subcommand.
        #[command(subcommand)]
        command: MigrateCommand,
    },
    /// Catalog maintenance commands.
    Catalog {
        /// Selected catalog subcommand.
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

/// Migration subcommands.
#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations (or render them with --sql).
    Upgrade(UpgradeCommand),
    /// Revert migrations down to a target version.
    Downgrade(DowngradeCommand),
    /// Print the recorded schema version.
    Current,
    /// List registered migrations and whether each is applied.
    History,
    /// Release a stale migration lock.
    Unlock,
}

/// Arguments for `migrate upgrade`.
#[derive(Args, Debug)]
struct UpgradeCommand {
    /// Target version (defaults to the latest registered version).
    #[arg(long, value_name = "VERSION")]
    target: Option<u32>,
    /// Render SQL instead of touching the database.
    #[arg(long)]
    sql: bool,
    /// Starting version for rendered SQL.
    #[arg(long, value_name = "VERSION", requires = "sql")]
    from: Option<u32>,
    /// Write rendered SQL files to the configured script location.
    #[arg(long, requires = "sql")]
    write: bool,
}

/// Arguments for `migrate downgrade`.
#[derive(Args, Debug)]
struct DowngradeCommand {
    /// Target version.
    #[arg(long, value_name = "VERSION")]
    target: u32,
    /// Render SQL instead of touching the database.
    #[arg(long)]
    sql: bool,
    /// Starting version for rendered SQL (defaults to the latest version).
    #[arg(long, value_name = "VERSION", requires = "sql")]
    from: Option<u32>,
    /// Write rendered SQL files to the configured script location.
    #[arg(long, requires = "sql")]
    write: bool,
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Ingest a JSON descriptor file (one object or an array).
    Ingest(IngestCommand),
    /// List stored tools as JSON lines ordered by name.
    List,
    /// Print one stored tool.
    Get(GetCommand),
    /// Delete a tool and retire its id.
    Delete(DeleteCommand),
}

/// Arguments for `catalog ingest`.
#[derive(Args, Debug)]
struct IngestCommand {
    /// Descriptor file path.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

/// Arguments for `catalog get`.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("key").required(true).args(["id", "name"])))]
struct GetCommand {
    /// Tool id.
    #[arg(long)]
    id: Option<String>,
    /// Tool name.
    #[arg(long)]
    name: Option<String>,
}

/// Arguments for `catalog delete`.
#[derive(Args, Debug)]
struct DeleteCommand {
    /// Tool id.
    #[arg(long)]
    id: String,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses arguments, runs the command, and maps failures to exit codes.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match run(cli) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr `tracing` subscriber.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Migrate {
            command,
        } => run_migrate(&config, command),
        Commands::Catalog {
            command,
        } => run_catalog(&config, command),
    }
}

/// Loads configuration, falling back to defaults when no file is present.
fn load_config(path: Option<&Path>) -> CliResult<ToolgateConfig> {
    let explicit = path.is_some() || std::env::var_os(CONFIG_ENV_VAR).is_some();
    if !explicit && !Path::new(DEFAULT_CONFIG_NAME).exists() {
        tracing::debug!("no config file found; using defaults");
        return Ok(ToolgateConfig::default());
    }
    ToolgateConfig::load(path).map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Migrate
// ============================================================================

/// Dispatches migration subcommands.
fn run_migrate(config: &ToolgateConfig, command: MigrateCommand) -> CliResult<ExitCode> {
    let engine = MigrationEngine::catalog()
        .with_lock_holder(config.migrations.lock_holder.clone())
        .with_audit(config.audit.build_sink().map_err(|err| CliError::new(err.to_string()))?);
    match command {
        MigrateCommand::Upgrade(args) => {
            if args.sql {
                let from = args.from.unwrap_or(0);
                let target = args.target.unwrap_or_else(|| engine.registry().head());
                return emit_offline(config, &engine, from, target, args.write);
            }
            let mut conn = open_migration_connection(config)?;
            let outcome = engine
                .upgrade(&mut conn, args.target, &CancelToken::new())
                .map_err(|failure| CliError::new(failure.to_string()))?;
            write_line(&outcome_message(outcome))?;
        }
        MigrateCommand::Downgrade(args) => {
            if args.sql {
                let from = args.from.unwrap_or_else(|| engine.registry().head());
                return emit_offline(config, &engine, from, args.target, args.write);
            }
            let mut conn = open_migration_connection(config)?;
            let outcome = engine
                .downgrade(&mut conn, args.target, &CancelToken::new())
                .map_err(|failure| CliError::new(failure.to_string()))?;
            write_line(&outcome_message(outcome))?;
        }
        MigrateCommand::Current => {
            let conn = open_migration_connection(config)?;
            let current =
                engine.current_version(&conn).map_err(|err| CliError::new(err.to_string()))?;
            write_line(&format!(
                "current version: {current} (latest {})",
                engine.registry().head()
            ))?;
        }
        MigrateCommand::History => {
            let conn = open_migration_connection(config)?;
            let current =
                engine.current_version(&conn).map_err(|err| CliError::new(err.to_string()))?;
            for summary in engine.registry().summaries() {
                let state = if summary.version <= current { "applied" } else { "pending" };
                let mode = if summary.offline_capable { "offline" } else { "online-only" };
                write_line(&format!(
                    "{:04} {} [{state}, {mode}]",
                    summary.version, summary.name
                ))?;
            }
        }
        MigrateCommand::Unlock => {
            let conn = open_migration_connection(config)?;
            let removed =
                engine.force_unlock(&conn).map_err(|err| CliError::new(err.to_string()))?;
            if removed {
                write_line("migration lock released")?;
            } else {
                write_line("no migration lock held")?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Renders or writes an offline script.
fn emit_offline(
    config: &ToolgateConfig,
    engine: &MigrationEngine,
    from: u32,
    target: u32,
    write: bool,
) -> CliResult<ExitCode> {
    let script: OfflineScript =
        engine.run_offline_from(from, target).map_err(|err| CliError::new(err.to_string()))?;
    if write {
        let written = script
            .write_to_dir(&config.migrations.script_location)
            .map_err(|err| CliError::new(err.to_string()))?;
        for path in written {
            write_line(&path.display().to_string())?;
        }
    } else {
        write_line(script.render().trim_end())?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Opens a connection for the migration engine.
fn open_migration_connection(config: &ToolgateConfig) -> CliResult<Connection> {
    let store_config =
        config.database.store_config().map_err(|err| CliError::new(err.to_string()))?;
    connect(&store_config).map_err(|err| CliError::new(err.to_string()))
}

/// Formats a successful online outcome.
fn outcome_message(outcome: OnlineOutcome) -> String {
    match outcome {
        OnlineOutcome::Applied {
            from,
            to,
            ..
        } => format!("migrated from version {from} to version {to}"),
        OnlineOutcome::NoPendingMigrations {
            ..
        } => "no pending migrations".to_string(),
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Dispatches catalog subcommands.
fn run_catalog(config: &ToolgateConfig, command: CatalogCommand) -> CliResult<ExitCode> {
    let store_config =
        config.database.store_config().map_err(|err| CliError::new(err.to_string()))?;
    let store =
        SqliteCatalogStore::open(store_config).map_err(|err| CliError::new(err.to_string()))?;
    match command {
        CatalogCommand::Ingest(args) => {
            let bytes = read_bytes_with_limit(&args.file, config.ingest.max_batch_bytes)
                .map_err(|err| CliError::new(err.describe(&args.file)))?;
            let value: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|err| CliError::new(format!("invalid descriptor json: {err}")))?;
            let raws = parse_descriptors(value).map_err(|err| CliError::new(err.to_string()))?;
            let audit = config.audit.build_sink().map_err(|err| CliError::new(err.to_string()))?;
            let ingestor =
                CatalogIngestor::new(Arc::new(store), audit, config.ingest.ingest_options());
            ingestor.warm_hint().map_err(|err| CliError::new(err.to_string()))?;
            let report = ingestor.ingest_batch(&raws, &CancelToken::new());
            for line in report_lines(&report) {
                write_line(&line)?;
            }
            if !report.is_complete() {
                return Ok(ExitCode::FAILURE);
            }
        }
        CatalogCommand::List => {
            let tools = store.list().map_err(|err| CliError::new(err.to_string()))?;
            for tool in tools {
                let line = serde_json::to_string(&tool)
                    .map_err(|err| CliError::new(err.to_string()))?;
                write_line(&line)?;
            }
        }
        CatalogCommand::Get(args) => {
            let found = match (args.id, args.name) {
                (Some(id), _) => store.get_by_id(&ToolId::new(id)),
                (None, Some(name)) => store.get_by_name(&ToolName::new(name)),
                (None, None) => return Err(CliError::new("either --id or --name is required")),
            }
            .map_err(|err| CliError::new(err.to_string()))?;
            let tool = found.ok_or_else(|| CliError::new("tool not found"))?;
            let body = serde_json::to_string_pretty(&tool)
                .map_err(|err| CliError::new(err.to_string()))?;
            write_line(&body)?;
        }
        CatalogCommand::Delete(args) => {
            store
                .delete(&ToolId::new(args.id.as_str()))
                .map_err(|err| CliError::new(err.to_string()))?;
            write_line(&format!("deleted tool {}", args.id))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Formats an ingestion report for stdout.
fn report_lines(report: &IngestReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.accepted.len() + report.failures.len() + 1);
    for normalized in &report.accepted {
        lines.push(format!(
            "accepted {} {} ({} repairs)",
            normalized.tool.id(),
            normalized.tool.name(),
            normalized.log.events().len()
        ));
    }
    for failure in &report.failures {
        lines.push(format!(
            "failed #{} {}: {}",
            failure.index, failure.original_name, failure.error
        ));
    }
    let summary = format!(
        "ingested {} tools, {} failed",
        report.accepted.len(),
        report.failures.len()
    );
    if report.cancelled {
        lines.push(format!("{summary}, {} skipped after cancellation", report.skipped));
    } else {
        lines.push(summary);
    }
    lines
}

// ============================================================================
// SECTION: IO Helpers
// ============================================================================

/// Errors raised while reading bounded input files.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

impl ReadLimitError {
    /// Formats the error for a given input path.
    fn describe(&self, path: &Path) -> String {
        match self {
            Self::Io(err) => format!("failed to read {}: {err}", path.display()),
            Self::TooLarge {
                size,
                limit,
            } => format!("{} is {size} bytes, above the {limit} byte limit", path.display()),
        }
    }
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Writes a line to stdout.
fn write_line(message: &str) -> CliResult<()> {
    write_stdout_line(message).map_err(|err| CliError::new(format!("stdout write failed: {err}")))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
