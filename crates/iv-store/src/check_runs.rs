// SPDX-License-Identifier: MIT OR Apache-2.0
//! Check-run repository.
//!
//! A run is created once (`status=started`) and finalized exactly once
//!. Intermediate stage updates
//! go through [`Store::advance_check_run_stage`]; finalization always goes
//! through [`Store::finalize_check_run`].

use crate::{classify, CheckRunRow, Store, StoreResult};
use chrono::Utc;

/// Fields needed to start a new check run.
#[derive(Debug, Clone)]
pub struct NewCheckRun {
    /// Server-generated v4 UUID.
    pub run_uuid: String,
    /// Monitor this run targets.
    pub monitor_id: i64,
    /// `"manual"` or `"scheduled"`.
    pub trigger_source: String,
}

/// The terminal counters and fields recorded at finalization.
#[derive(Debug, Clone, Default)]
pub struct CheckRunFinalization {
    /// Final status: `success | partial | error`.
    pub status: String,
    /// Furthest stage reached.
    pub last_stage: String,
    /// Folder that was opened, if any.
    pub folder: Option<String>,
    /// UIDVALIDITY observed, if the mailbox was opened.
    pub uidvalidity: Option<i64>,
    /// The executed search query string.
    pub search_query: Option<String>,
    /// Messages found.
    pub found_count: i64,
    /// Messages fetched.
    pub fetched_count: i64,
    /// Total attachments seen.
    pub attachments_total: i64,
    /// Attachments recognized as supported.
    pub attachments_supported: i64,
    /// Messages skipped.
    pub emails_skipped: i64,
    /// Messages processed.
    pub emails_processed: i64,
    /// Invoices created.
    pub invoices_created: i64,
    /// Per-message errors.
    pub errors_count: i64,
    /// JSON-encoded per-stage timings.
    pub stage_timings_json: Option<String>,
    /// Run-level error message, if `status == "error"`.
    pub error_message: Option<String>,
}

impl Store {
    /// Start a new check run with `status="started"`, `last_stage="init"`.
    pub async fn start_check_run(&self, new: NewCheckRun) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO email_check_runs
                (run_uuid, monitor_id, trigger_source, started_at, status, last_stage)
             VALUES (?, ?, ?, ?, 'started', 'init')",
        )
        .bind(&new.run_uuid)
        .bind(new.monitor_id)
        .bind(&new.trigger_source)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Advance a run's `last_stage`. Callers are responsible for only calling
    /// this with stages in the fixed monotonic order; the
    /// store does not itself validate monotonicity, that invariant is a
    /// property of the check engine's single-threaded stage loop.
    pub async fn advance_check_run_stage(&self, run_uuid: &str, stage: &str) -> StoreResult<()> {
        sqlx::query("UPDATE email_check_runs SET last_stage = ? WHERE run_uuid = ?")
            .bind(stage)
            .bind(run_uuid)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    /// Finalize a run exactly once.
    pub async fn finalize_check_run(
        &self,
        run_uuid: &str,
        f: CheckRunFinalization,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE email_check_runs
             SET finished_at = ?, status = ?, last_stage = ?, folder = ?, uidvalidity = ?,
                 search_query = ?, found_count = ?, fetched_count = ?, attachments_total = ?,
                 attachments_supported = ?, emails_skipped = ?, emails_processed = ?,
                 invoices_created = ?, errors_count = ?, stage_timings_json = ?, error_message = ?
             WHERE run_uuid = ?",
        )
        .bind(Utc::now())
        .bind(&f.status)
        .bind(&f.last_stage)
        .bind(&f.folder)
        .bind(f.uidvalidity)
        .bind(&f.search_query)
        .bind(f.found_count)
        .bind(f.fetched_count)
        .bind(f.attachments_total)
        .bind(f.attachments_supported)
        .bind(f.emails_skipped)
        .bind(f.emails_processed)
        .bind(f.invoices_created)
        .bind(f.errors_count)
        .bind(&f.stage_timings_json)
        .bind(&f.error_message)
        .bind(run_uuid)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Fetch a single check run by its UUID.
    pub async fn get_check_run(&self, run_uuid: &str) -> StoreResult<Option<CheckRunRow>> {
        let row = sqlx::query_as::<_, CheckRunRow>("SELECT * FROM email_check_runs WHERE run_uuid = ?")
            .bind(run_uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row)
    }

    /// List the most recent check runs for a monitor, newest first.
    pub async fn list_check_runs(&self, monitor_id: i64, limit: i64) -> StoreResult<Vec<CheckRunRow>> {
        let rows = sqlx::query_as::<_, CheckRunRow>(
            "SELECT * FROM email_check_runs WHERE monitor_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(monitor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitors::NewMonitor;

    async fn seed_monitor(store: &Store) -> i64 {
        let user_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, name, password_hash, role, created_at, updated_at)
             VALUES ('a@b.com','A','h','admin',?,?) RETURNING id",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(store.pool())
        .await
        .unwrap();
        store
            .create_monitor(NewMonitor {
                user_id,
                email_address: "m@x.com".into(),
                mailbox_folder: "inbox".into(),
                auth_kind: "password".into(),
                auth_material: "x".into(),
                require_invoice_keywords: false,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_advance_and_finalize_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let monitor_id = seed_monitor(&store).await;
        let run_uuid = "11111111-1111-1111-1111-111111111111".to_string();

        store
            .start_check_run(NewCheckRun {
                run_uuid: run_uuid.clone(),
                monitor_id,
                trigger_source: "manual".into(),
            })
            .await
            .unwrap();

        for stage in ["config", "connect", "open_folder", "search", "fetch", "process"] {
            store.advance_check_run_stage(&run_uuid, stage).await.unwrap();
        }

        store
            .finalize_check_run(
                &run_uuid,
                CheckRunFinalization {
                    status: "success".into(),
                    last_stage: "complete".into(),
                    found_count: 3,
                    fetched_count: 3,
                    emails_processed: 2,
                    emails_skipped: 1,
                    invoices_created: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let run = store.get_check_run(&run_uuid).await.unwrap().unwrap();
        assert_eq!(run.status, "success");
        assert_eq!(run.last_stage, "complete");
        assert_eq!(run.invoices_created, 2);
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn list_check_runs_orders_newest_first() {
        let store = Store::open_in_memory().await.unwrap();
        let monitor_id = seed_monitor(&store).await;
        for i in 0..3 {
            let uuid = format!("0000000{i}-0000-0000-0000-000000000000");
            store
                .start_check_run(NewCheckRun {
                    run_uuid: uuid,
                    monitor_id,
                    trigger_source: "manual".into(),
                })
                .await
                .unwrap();
        }
        let runs = store.list_check_runs(monitor_id, 10).await.unwrap();
        assert_eq!(runs.len(), 3);
    }
}
