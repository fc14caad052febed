// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable mirror of the in-memory parse tracer.
//!
//! The tracer itself (`iv-tracer`) is a bounded ring buffer that forgets a
//! run once it sweeps past its TTL. This repository gives a run's trace a
//! second, durable home: written once at finalization, best-effort, never on
//! the hot path of a gate decision.

use crate::{classify, ParseTraceRow, Store, StoreResult};
use chrono::Utc;

/// Fields needed to persist one run's trace.
#[derive(Debug, Clone)]
pub struct NewParseTrace {
    /// The run this trace belongs to.
    pub run_id: String,
    /// Owning user, if known.
    pub user_id: Option<i64>,
    /// Total wall-clock duration of the run, in milliseconds.
    pub duration_ms: i64,
    /// Total steps recorded.
    pub step_count: i64,
    /// Count of warning-or-worse steps.
    pub warnings: i64,
    /// Count of error steps.
    pub errors: i64,
    /// Full trace, JSON-encoded.
    pub trace_json: String,
    /// Condensed summary, JSON-encoded.
    pub summary_json: String,
}

impl Store {
    /// Persist a run's trace, replacing any prior row for the same `run_id`.
    /// A write here is never allowed to fail the run it describes — callers
    /// should log and continue on error rather than propagate it into the
    /// run's own result.
    pub async fn persist_parse_trace(&self, t: NewParseTrace) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO parse_traces
                (run_id, user_id, duration_ms, step_count, warnings, errors,
                 trace_json, summary_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(run_id) DO UPDATE SET
                user_id = excluded.user_id,
                duration_ms = excluded.duration_ms,
                step_count = excluded.step_count,
                warnings = excluded.warnings,
                errors = excluded.errors,
                trace_json = excluded.trace_json,
                summary_json = excluded.summary_json,
                created_at = excluded.created_at",
        )
        .bind(&t.run_id)
        .bind(t.user_id)
        .bind(t.duration_ms)
        .bind(t.step_count)
        .bind(t.warnings)
        .bind(t.errors)
        .bind(&t.trace_json)
        .bind(&t.summary_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Fetch a run's persisted trace, if one was ever written.
    pub async fn get_parse_trace(&self, run_id: &str) -> StoreResult<Option<ParseTraceRow>> {
        let row = sqlx::query_as::<_, ParseTraceRow>("SELECT * FROM parse_traces WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row)
    }

    /// List the most recently written traces, newest first.
    pub async fn list_recent_parse_traces(&self, limit: i64) -> StoreResult<Vec<ParseTraceRow>> {
        let rows = sqlx::query_as::<_, ParseTraceRow>(
            "SELECT * FROM parse_traces ORDER BY created_at DESC LIMIT ?",
        )
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

    fn sample(run_id: &str) -> NewParseTrace {
        NewParseTrace {
            run_id: run_id.to_string(),
            user_id: Some(1),
            duration_ms: 42,
            step_count: 5,
            warnings: 1,
            errors: 0,
            trace_json: "[]".to_string(),
            summary_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn persist_and_fetch_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        store.persist_parse_trace(sample("run-1")).await.unwrap();
        let row = store.get_parse_trace("run-1").await.unwrap().unwrap();
        assert_eq!(row.duration_ms, 42);
        assert_eq!(row.warnings, 1);
    }

    #[tokio::test]
    async fn repersisting_same_run_id_overwrites() {
        let store = Store::open_in_memory().await.unwrap();
        store.persist_parse_trace(sample("run-1")).await.unwrap();
        let mut updated = sample("run-1");
        updated.duration_ms = 99;
        store.persist_parse_trace(updated).await.unwrap();

        let rows = store.list_recent_parse_traces(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_ms, 99);
    }

    #[tokio::test]
    async fn missing_trace_returns_none() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.get_parse_trace("nope").await.unwrap().is_none());
    }
}
