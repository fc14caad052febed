// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use iv_backup::BackupSupervisor;
use iv_config::PipelineConfig;
use iv_email::CheckEngine;
use iv_proc::ProcRunner;
use iv_scheduler::Scheduler;
use iv_store::Store;
use iv_tracer::Tracer;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "iv-scheduler", version, about = "Invoice pipeline scheduler daemon")]
struct Args {
    /// Seconds between scheduled check fan-outs across active monitors.
    #[arg(long, default_value_t = 300)]
    poll_interval_secs: u64,

    /// Max messages fetched per monitor per scheduled check.
    #[arg(long, default_value_t = 50)]
    limit: usize,

    /// Days back the `SINCE` search covers on a scheduled check.
    #[arg(long, default_value_t = 7)]
    since_days: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, warnings) = PipelineConfig::from_env().context("load configuration")?;
    for w in &warnings {
        tracing::warn!("{w}");
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.node_env == "production" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(config = ?config.redacted_summary(), "iv-scheduler starting");

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("open database at {}", config.db_path))?;

    let engine = Arc::new(CheckEngine::new(
        store.clone(),
        Tracer::default(),
        ProcRunner::default(),
        config.clone(),
        None,
    ));

    let backup = Arc::new(BackupSupervisor::new(&config.db_path, config.backup.clone()));
    backup.start().await.context("start backup supervisor")?;

    let check_opts = iv_email::CheckOptions {
        since_days: args.since_days,
        limit: args.limit,
        folder: None,
    };

    let scheduler = Scheduler::new(
        engine,
        store,
        Duration::from_secs(args.poll_interval_secs),
    )
    .with_check_options(check_opts);

    scheduler
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    backup.stop().await;
    info!("iv-scheduler shut down cleanly");
    Ok(())
}
