// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Scheduled fan-out of email checks across active monitors."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Scheduled checks run on a timer, independently of manual (on-demand)
//! checks triggered elsewhere. One [`Scheduler`] tick lists every active
//! monitor and fires a `CheckEngine::check` call per monitor concurrently;
//! the monitor lock (owned by `iv-email`) is what actually serializes
//! concurrent attempts against the same monitor, not this scheduler.

use iv_email::{CheckEngine, CheckOptions, CheckTrigger};
use iv_store::Store;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fans out scheduled checks across every active monitor on a fixed
/// interval, independent of the backup supervisor's own timer.
pub struct Scheduler {
    engine: Arc<CheckEngine>,
    store: Store,
    poll_interval: Duration,
    check_opts: CheckOptions,
}

impl Scheduler {
    /// Build a scheduler around an existing check engine and store handle.
    #[must_use]
    pub fn new(engine: Arc<CheckEngine>, store: Store, poll_interval: Duration) -> Self {
        Self {
            engine,
            store,
            poll_interval,
            check_opts: CheckOptions::default(),
        }
    }

    /// Override the `CheckOptions` applied to every scheduled run (defaults
    /// to `CheckOptions::default()`, i.e. `since_days=7, limit=50`).
    #[must_use]
    pub fn with_check_options(mut self, opts: CheckOptions) -> Self {
        self.check_opts = opts;
        self
    }

    /// Run one fan-out tick: list active monitors, fire a scheduled check
    /// against each concurrently, and wait for all of them to finish.
    /// Per-monitor failures (including `Locked`, when a manual check is
    /// already in flight) are logged and do not affect sibling monitors.
    pub async fn tick(&self) {
        let monitors = match self.store.list_active_monitors().await {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "failed to list active monitors for scheduled tick");
                return;
            }
        };

        if monitors.is_empty() {
            return;
        }

        let mut joins = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            let engine = Arc::clone(&self.engine);
            let opts = self.check_opts.clone();
            joins.push(tokio::spawn(async move {
                let monitor_id = monitor.id;
                match engine.check(monitor_id, CheckTrigger::Scheduled, opts).await {
                    Ok(result) => {
                        info!(
                            monitor_id,
                            run_uuid = %result.run_uuid,
                            processed = result.processed,
                            invoices_created = result.invoices_created,
                            errors = result.errors,
                            "scheduled check completed"
                        );
                    }
                    Err(e) => {
                        warn!(monitor_id, error = %e, "scheduled check did not complete");
                    }
                }
            }));
        }

        for join in joins {
            if let Err(e) = join.await {
                error!(error = %e, "scheduled check task panicked");
            }
        }
    }

    /// Run the scheduler loop until `shutdown` resolves. Each tick is
    /// awaited in full before the next interval starts; a slow monitor fan-out
    /// delays, but never skips, subsequent ticks.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iv_config::PipelineConfig;
    use iv_proc::ProcRunner;
    use iv_tracer::Tracer;
    use std::time::Duration as StdDuration;

    async fn engine_with_empty_store() -> (Arc<CheckEngine>, Store) {
        let store = Store::open_in_memory().await.unwrap();
        let (config, _warnings) =
            PipelineConfig::from_source(&iv_config::FakeEnv::default()).unwrap();
        let engine = Arc::new(CheckEngine::new(
            store.clone(),
            Tracer::default(),
            ProcRunner::default(),
            config,
            None,
        ));
        (engine, store)
    }

    #[tokio::test]
    async fn tick_with_no_active_monitors_is_a_no_op() {
        let (engine, store) = engine_with_empty_store().await;
        let scheduler = Scheduler::new(engine, store, StdDuration::from_secs(60));
        scheduler.tick().await;
    }

    #[tokio::test]
    async fn run_until_stops_on_shutdown_signal() {
        let (engine, store) = engine_with_empty_store().await;
        let scheduler = Scheduler::new(engine, store, StdDuration::from_millis(20));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            let _ = tx.send(());
        });
        scheduler
            .run_until(async move {
                let _ = rx.await;
            })
            .await;
    }
}
