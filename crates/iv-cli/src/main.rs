// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iv_backup::BackupSupervisor;
use iv_config::PipelineConfig;
use iv_core::{SourceRef, SourceRefKind, SourceType};
use iv_email::{CheckEngine, CheckOptions, CheckTrigger};
use iv_error::IvError;
use iv_extraction::{extract, ExtractionInput};
use iv_proc::ProcRunner;
use iv_store::{NewIngestionRun, NewInvoiceItem, Store, ADMIN_USER_ID};
use iv_tracer::Tracer;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit code used when a command returns a structured pipeline error.
const EXIT_PIPELINE_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "iv", version, about = "Invoice ingestion pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print raw JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a check against one monitor, writing dedupe state and counters.
    Check {
        /// Monitor id to check.
        monitor_id: i64,
        /// Days back the `SINCE` search covers.
        #[arg(long, default_value_t = 7)]
        since_days: u32,
        /// Max messages fetched this run.
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Override the monitor's configured mailbox folder.
        #[arg(long)]
        folder: Option<String>,
    },

    /// Read-only variant of `check`: never writes dedupe state.
    Diagnose {
        /// Monitor id to diagnose.
        monitor_id: i64,
        #[arg(long, default_value_t = 7)]
        since_days: u32,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        folder: Option<String>,
        /// Ignore the keyword gate (G4) for this run.
        #[arg(long)]
        bypass_keywords: bool,
        /// Ignore prior dedupe entries for this run.
        #[arg(long)]
        bypass_dedupe: bool,
    },

    /// Inspect monitor history.
    #[command(subcommand)]
    Monitors(MonitorsCommand),

    /// List recent check runs for a monitor.
    Runs {
        /// Monitor id.
        monitor_id: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// List recent processing log entries.
    Logs {
        /// Look up by check-run UUID instead of monitor id.
        #[arg(long, conflicts_with = "monitor_id")]
        run_uuid: Option<String>,
        /// Look up by monitor id (most recent entries across all runs).
        #[arg(long)]
        monitor_id: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Extract a canonical invoice directly from a file, bypassing email.
    Extract {
        /// Path to the PDF/image/text file to extract.
        file: PathBuf,
        /// MIME type hint, if known (otherwise detected from magic bytes).
        #[arg(long)]
        mime_type: Option<String>,
        /// Vendor hint that takes priority over text-based detection.
        #[arg(long)]
        vendor_hint: Option<String>,
        /// Persist the result as an ingestion run owned by the admin user.
        #[arg(long)]
        persist: bool,
    },

    /// Validate a canonical invoice JSON document against the v1 schema.
    Validate {
        /// Path to the canonical invoice JSON file.
        file: PathBuf,
    },

    /// Print the canonical invoice v1 JSON schema.
    Schema,

    /// Backup supervisor operations.
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Subcommand, Debug)]
enum MonitorsCommand {
    /// List every active monitor.
    List,
    /// Show one monitor by id.
    Show {
        /// Monitor id.
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    /// Take a snapshot immediately.
    Create,
    /// List retained snapshots.
    List,
    /// Restore a snapshot over the live database.
    Restore {
        /// Snapshot filename, as returned by `backup list`.
        name: String,
    },
    /// Print aggregate snapshot statistics.
    Stats,
    /// Delete snapshots older than the configured retention window.
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, warnings) = PipelineConfig::from_env().context("load configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.node_env == "production" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    for w in &warnings {
        tracing::warn!("{w}");
    }

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("open database at {}", config.db_path))?;

    let result = run_command(cli.command, &store, &config, cli.json).await;

    if let Err(e) = result {
        if cli.json {
            println!("{}", serde_json::to_string(&IvError::from(e))?);
        } else {
            eprintln!("error: {e}");
        }
        std::process::exit(EXIT_PIPELINE_ERROR);
    }

    Ok(())
}

async fn run_command(
    command: Commands,
    store: &Store,
    config: &PipelineConfig,
    json: bool,
) -> Result<(), CliError> {
    match command {
        Commands::Check {
            monitor_id,
            since_days,
            limit,
            folder,
        } => {
            let engine = check_engine(store, config);
            let result = engine
                .check(monitor_id, CheckTrigger::Manual, CheckOptions { since_days, limit, folder })
                .await?;
            print_result(&result, json);
        }
        Commands::Diagnose {
            monitor_id,
            since_days,
            limit,
            folder,
            bypass_keywords,
            bypass_dedupe,
        } => {
            let engine = check_engine(store, config);
            let result = engine
                .diagnose(
                    monitor_id,
                    CheckOptions { since_days, limit, folder },
                    bypass_keywords,
                    bypass_dedupe,
                )
                .await?;
            print_result(&result, json);
        }
        Commands::Monitors(MonitorsCommand::List) => {
            let monitors = store.list_active_monitors().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&monitors)?);
            } else {
                for m in monitors {
                    println!(
                        "{:>5}  {:<32} processed={} invoices={} active={}",
                        m.id, m.email_address, m.emails_processed_count, m.invoices_created_count, m.is_active
                    );
                }
            }
        }
        Commands::Monitors(MonitorsCommand::Show { id }) => {
            let monitor = store
                .get_monitor(id)
                .await?
                .ok_or_else(|| CliError::NotFound(format!("no such monitor: {id}")))?;
            println!("{}", serde_json::to_string_pretty(&monitor)?);
        }
        Commands::Runs { monitor_id, limit } => {
            let engine = check_engine(store, config);
            let runs = engine.list_check_runs(monitor_id, limit).await?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
        Commands::Logs { run_uuid, monitor_id, limit } => {
            let engine = check_engine(store, config);
            let logs = match (run_uuid, monitor_id) {
                (Some(run_uuid), _) => engine.list_processing_logs_for_run(&run_uuid, limit).await?,
                (None, Some(monitor_id)) => {
                    engine.list_processing_logs_for_monitor(monitor_id, limit).await?
                }
                (None, None) => return Err(CliError::InvalidInput("pass either --run-uuid or --monitor-id".into())),
            };
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
        Commands::Extract {
            file,
            mime_type,
            vendor_hint,
            persist,
        } => {
            run_extract(store, &file, mime_type, vendor_hint, persist, json).await?;
        }
        Commands::Validate { file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| CliError::InvalidInput(format!("read {}: {e}", file.display())))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| CliError::InvalidInput(format!("parse {}: {e}", file.display())))?;
            match iv_validate::validate_value(&value) {
                Ok(()) => println!("valid"),
                Err(e) => return Err(CliError::InvalidInput(e.to_string())),
            }
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&iv_validate::schema_json())?);
        }
        Commands::Backup(cmd) => run_backup(config, cmd, json).await?,
    }
    Ok(())
}

fn check_engine(store: &Store, config: &PipelineConfig) -> CheckEngine {
    CheckEngine::new(store.clone(), Tracer::default(), ProcRunner::default(), config.clone(), None)
}

async fn run_extract(
    store: &Store,
    file: &PathBuf,
    mime_type: Option<String>,
    vendor_hint: Option<String>,
    persist: bool,
    json: bool,
) -> Result<(), CliError> {
    let bytes = std::fs::read(file)
        .map_err(|e| CliError::InvalidInput(format!("read {}: {e}", file.display())))?;
    let file_size = bytes.len() as i64;

    let input = ExtractionInput {
        bytes,
        source_type: SourceType::Upload,
        source_ref: SourceRef {
            kind: SourceRefKind::Path,
            value: Some(file.display().to_string()),
            mime_type,
        },
        vendor_hint,
    };

    let proc = ProcRunner::default();
    let output = extract(&proc, input).await?;

    if persist {
        let run_id = format!("upload-{}-{:x}", chrono::Utc::now().timestamp_millis(), rand::random::<u32>());
        let vendor_name = output.build.invoice.parties.vendor.name.clone();
        let vendor = (!vendor_name.is_empty()).then_some(vendor_name);
        let total_cents = output
            .build
            .invoice
            .totals
            .invoice_total
            .as_ref()
            .map(iv_core::Money::cents);

        store
            .create_ingestion_run(NewIngestionRun {
                run_id: run_id.clone(),
                user_id: ADMIN_USER_ID,
                account: None,
                file_name: file.file_name().map(|n| n.to_string_lossy().to_string()),
                file_size: Some(file_size),
            })
            .await?;

        let items: Vec<NewInvoiceItem> = output
            .build
            .invoice
            .line_items
            .iter()
            .map(|li| NewInvoiceItem {
                description: li.raw_description.clone(),
                quantity: li.quantity,
                unit_price_cents: li.unit_price.as_ref().map(iv_core::Money::cents),
                total_cents: li.total_price.as_ref().map(iv_core::Money::cents),
                category: None,
            })
            .collect();

        store
            .complete_ingestion_run(&run_id, vendor.as_deref(), total_cents, &items)
            .await?;

        if !json {
            println!("ingestion run: {run_id}");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&output.build.invoice)?);
    } else {
        println!(
            "doc_id={} combined_confidence={:.2} warnings={}",
            output.build.invoice.doc.doc_id,
            output.combined_confidence,
            output.warnings.len()
        );
    }

    Ok(())
}

async fn run_backup(config: &PipelineConfig, cmd: BackupCommand, json: bool) -> Result<(), CliError> {
    let supervisor = BackupSupervisor::new(&config.db_path, config.backup.clone());
    match cmd {
        BackupCommand::Create => {
            let snapshot = supervisor.create_snapshot().await?;
            println!("{}", render(&snapshot, json));
        }
        BackupCommand::List => {
            let snapshots = supervisor.list()?;
            println!("{}", render(&snapshots, json));
        }
        BackupCommand::Restore { name } => {
            let outcome = supervisor.restore(&name).await?;
            println!("{}", render(&outcome, json));
        }
        BackupCommand::Stats => {
            let stats = supervisor.stats()?;
            println!("{}", render(&stats, json));
        }
        BackupCommand::Cleanup => {
            let deleted = supervisor.cleanup().await?;
            if json {
                println!("{{\"deleted\":{deleted}}}");
            } else {
                println!("deleted {deleted} expired snapshot(s)");
            }
        }
    }
    Ok(())
}

fn render<T: serde::Serialize + std::fmt::Debug>(value: &T, json: bool) -> String {
    if json {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
    } else {
        format!("{value:?}")
    }
}

fn print_result(result: &iv_email::CheckResult, json: bool) {
    if json {
        println!("{}", result_to_json(result));
    } else {
        println!(
            "run_uuid={} stage={} success={} found={} fetched={} processed={} skipped={} invoices_created={} errors={} total_time_ms={}",
            result.run_uuid,
            result.stage,
            result.success,
            result.found,
            result.fetched,
            result.processed,
            result.skipped,
            result.invoices_created,
            result.errors,
            result.total_time_ms,
        );
        for detail in &result.email_details {
            println!(
                "  uid={} status={} invoices_created={} skip_reason={}",
                detail.uid,
                detail.status,
                detail.invoices_created,
                detail.skip_reason.as_deref().unwrap_or("-"),
            );
        }
        if let Some(err) = &result.error {
            println!("error: {err}");
        }
    }
}

fn result_to_json(result: &iv_email::CheckResult) -> String {
    let details: Vec<_> = result
        .email_details
        .iter()
        .map(|d| {
            serde_json::json!({
                "uid": d.uid,
                "subject": d.subject,
                "status": d.status,
                "skip_reason": d.skip_reason,
                "invoices_created": d.invoices_created,
            })
        })
        .collect();
    serde_json::json!({
        "run_uuid": result.run_uuid,
        "stage": result.stage,
        "success": result.success,
        "found": result.found,
        "fetched": result.fetched,
        "processed": result.processed,
        "skipped": result.skipped,
        "invoices_created": result.invoices_created,
        "errors": result.errors,
        "email_details": details,
        "total_time_ms": result.total_time_ms,
        "error": result.error,
    })
    .to_string()
}

/// Thin CLI-local error wrapper so every command can use `?` against either
/// an [`IvError`] or a store/backup error without the CLI binary depending
/// on every crate's concrete error type at the call site.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] IvError),
    #[error(transparent)]
    Store(#[from] iv_store::StoreError),
    #[error(transparent)]
    Compress(#[from] iv_compress::CompressError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<CliError> for anyhow::Error {
    fn from(e: CliError) -> Self {
        anyhow::anyhow!(e)
    }
}

impl From<CliError> for IvError {
    fn from(e: CliError) -> Self {
        match e {
            CliError::Pipeline(e) => e,
            CliError::Store(e) => e.into(),
            CliError::Compress(e) => {
                IvError::new(iv_error::ErrorCode::ProcessingError, e.to_string())
            }
            CliError::InvalidInput(msg) => IvError::new(iv_error::ErrorCode::InvalidInput, msg),
            CliError::NotFound(msg) => IvError::new(iv_error::ErrorCode::NotFound, msg),
            CliError::Json(e) => IvError::new(iv_error::ErrorCode::Internal, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_check_subcommand() {
        let cli = Cli::parse_from(["iv", "check", "7", "--since-days", "3"]);
        match cli.command {
            Commands::Check { monitor_id, since_days, .. } => {
                assert_eq!(monitor_id, 7);
                assert_eq!(since_days, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_backup_restore_subcommand() {
        let cli = Cli::parse_from(["iv", "backup", "restore", "backup-2026.db.gz"]);
        match cli.command {
            Commands::Backup(BackupCommand::Restore { name }) => {
                assert_eq!(name, "backup-2026.db.gz");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
