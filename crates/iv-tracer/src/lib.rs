// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Append-only, bounded, run-scoped step trace log (ParseTrace)."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `ParseTrace` is a run's step log, versioned `trace_version="1.0"`, kept in
//! an in-memory ring buffer of bounded capacity (~100 most recent entries)
//! with a retention TTL (~24h), optionally mirrored to the store. The tracer
//! is a handle passed into each pipeline stage rather than a process-level
//! singleton.
//!
//! [`Tracer`] is that handle. It owns no global state itself — callers hold
//! a `Tracer` (cheaply `Clone`, internally `Arc`-backed) and pass it into
//! each pipeline stage; writes for a given `run_id` are serialized through a
//! per-run [`tokio::sync::Mutex`] so concurrent stages never interleave
//! entries within one run, while different runs proceed independently.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Schema version tag carried on every emitted trace.
pub const TRACE_VERSION: &str = "1.0";

/// Default bounded ring-buffer capacity per run (~100 most recent entries).
pub const DEFAULT_CAPACITY: usize = 100;

/// Default retention TTL for an idle run's trace.
pub const DEFAULT_TTL: chrono::Duration = chrono::Duration::hours(24);

/// A single recorded step within a run's trace.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TraceStep {
    /// When this step was recorded.
    pub at: DateTime<Utc>,
    /// Pipeline stage or sub-stage name (e.g. `"ocr.psm6"`, `"check.search"`).
    pub stage: String,
    /// Human-readable step description.
    pub message: String,
    /// Arbitrary structured fields attached to this step.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Severity-like level, mirroring `tracing` levels.
    pub level: TraceLevel,
}

/// Step severity, mirroring `tracing`'s level vocabulary so a trace step and
/// its corresponding log line can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    /// Fine-grained detail, only emitted when verbose tracing is enabled.
    Debug,
    /// Normal step-completed entries.
    Info,
    /// Recoverable anomalies (e.g. a retried OCR pass).
    Warn,
    /// Stage-terminating failures.
    Error,
}

/// A run's complete, bounded trace at the point it was read.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ParseTrace {
    /// Schema version, always [`TRACE_VERSION`].
    pub trace_version: String,
    /// The run this trace belongs to.
    pub run_id: String,
    /// Steps in chronological order (oldest first), bounded to the ring
    /// buffer's capacity.
    pub steps: Vec<TraceStep>,
    /// Count of steps ever recorded for this run, which may exceed
    /// `steps.len()` once the ring buffer has wrapped.
    pub total_recorded: u64,
}

struct RunTrace {
    steps: VecDeque<TraceStep>,
    total_recorded: u64,
    last_touched: DateTime<Utc>,
}

impl RunTrace {
    fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            total_recorded: 0,
            last_touched: Utc::now(),
        }
    }
}

struct Inner {
    capacity: usize,
    ttl: chrono::Duration,
    runs: Mutex<HashMap<String, Arc<Mutex<RunTrace>>>>,
}

/// A handle to the process-wide (but not globally-singleton — it is
/// constructed explicitly and passed around) trace store.
///
/// Cloning a `Tracer` is cheap; all clones share the same underlying ring
/// buffers.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<Inner>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl Tracer {
    /// Create a tracer with the given per-run ring-buffer capacity and TTL.
    #[must_use]
    pub fn new(capacity: usize, ttl: chrono::Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                ttl,
                runs: Mutex::new(HashMap::new()),
            }),
        }
    }

    async fn run_slot(&self, run_id: &str) -> Arc<Mutex<RunTrace>> {
        let mut runs = self.inner.runs.lock().await;
        runs.entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RunTrace::new())))
            .clone()
    }

    /// Record a step for `run_id`. Writes to the same run are serialized;
    /// writes to different runs proceed concurrently.
    pub async fn record(
        &self,
        run_id: &str,
        stage: impl Into<String>,
        message: impl Into<String>,
        level: TraceLevel,
        fields: serde_json::Map<String, serde_json::Value>,
    ) {
        let slot = self.run_slot(run_id).await;
        let mut run = slot.lock().await;
        if run.steps.len() >= self.inner.capacity {
            run.steps.pop_front();
        }
        run.steps.push_back(TraceStep {
            at: Utc::now(),
            stage: stage.into(),
            message: message.into(),
            fields,
            level,
        });
        run.total_recorded += 1;
        run.last_touched = Utc::now();
    }

    /// Shorthand for [`Tracer::record`] at [`TraceLevel::Info`] with no
    /// structured fields.
    pub async fn info(&self, run_id: &str, stage: impl Into<String>, message: impl Into<String>) {
        self.record(run_id, stage, message, TraceLevel::Info, Default::default())
            .await;
    }

    /// Shorthand for [`Tracer::record`] at [`TraceLevel::Error`].
    pub async fn error(&self, run_id: &str, stage: impl Into<String>, message: impl Into<String>) {
        self.record(run_id, stage, message, TraceLevel::Error, Default::default())
            .await;
    }

    /// Read back the current trace for `run_id`, or `None` if nothing has
    /// been recorded (or it was already evicted by [`Tracer::sweep_expired`]).
    pub async fn read(&self, run_id: &str) -> Option<ParseTrace> {
        let runs = self.inner.runs.lock().await;
        let slot = runs.get(run_id)?.clone();
        drop(runs);
        let run = slot.lock().await;
        Some(ParseTrace {
            trace_version: TRACE_VERSION.to_string(),
            run_id: run_id.to_string(),
            steps: run.steps.iter().cloned().collect(),
            total_recorded: run.total_recorded,
        })
    }

    /// Remove traces whose `last_touched` exceeds the configured TTL.
    /// Intended to run on a periodic sweep (the scheduler's own cadence, not
    /// part of this crate's responsibility).
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut runs = self.inner.runs.lock().await;
        let mut expired = Vec::new();
        for (id, slot) in runs.iter() {
            let run = slot.lock().await;
            if now.signed_duration_since(run.last_touched) > self.inner.ttl {
                expired.push(id.clone());
            }
        }
        for id in &expired {
            runs.remove(id);
        }
        expired.len()
    }

    /// Number of runs currently tracked (for diagnostics/metrics).
    pub async fn tracked_run_count(&self) -> usize {
        self.inner.runs.lock().await.len()
    }
}

/// Summary shape suitable for `parse_traces.summary_json` persistence: a
/// condensed view that doesn't repeat every step's full field map.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TraceSummary {
    /// Total steps recorded across the run's lifetime.
    pub step_count: u64,
    /// Count of steps at [`TraceLevel::Warn`] or [`TraceLevel::Error`].
    pub warnings: u64,
    /// Count of steps at [`TraceLevel::Error`].
    pub errors: u64,
}

impl From<&ParseTrace> for TraceSummary {
    fn from(trace: &ParseTrace) -> Self {
        let warnings = trace
            .steps
            .iter()
            .filter(|s| matches!(s.level, TraceLevel::Warn | TraceLevel::Error))
            .count() as u64;
        let errors = trace
            .steps
            .iter()
            .filter(|s| matches!(s.level, TraceLevel::Error))
            .count() as u64;
        Self {
            step_count: trace.total_recorded,
            warnings,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_reads_back_steps_in_order() {
        let tracer = Tracer::default();
        tracer.info("run-1", "init", "starting").await;
        tracer.info("run-1", "connect", "connected").await;
        let trace = tracer.read("run-1").await.unwrap();
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[0].stage, "init");
        assert_eq!(trace.steps[1].stage, "connect");
        assert_eq!(trace.trace_version, TRACE_VERSION);
    }

    #[tokio::test]
    async fn ring_buffer_is_bounded() {
        let tracer = Tracer::new(3, DEFAULT_TTL);
        for i in 0..10 {
            tracer.info("run-1", "stage", format!("step {i}")).await;
        }
        let trace = tracer.read("run-1").await.unwrap();
        assert_eq!(trace.steps.len(), 3);
        assert_eq!(trace.total_recorded, 10);
        // Only the most recent 3 remain.
        assert_eq!(trace.steps[2].message, "step 9");
    }

    #[tokio::test]
    async fn different_runs_are_independent() {
        let tracer = Tracer::default();
        tracer.info("run-1", "a", "x").await;
        tracer.info("run-2", "b", "y").await;
        assert_eq!(tracer.read("run-1").await.unwrap().steps.len(), 1);
        assert_eq!(tracer.read("run-2").await.unwrap().steps.len(), 1);
    }

    #[tokio::test]
    async fn unknown_run_reads_back_none() {
        let tracer = Tracer::default();
        assert!(tracer.read("no-such-run").await.is_none());
    }

    #[tokio::test]
    async fn sweep_expired_removes_old_runs_only() {
        let tracer = Tracer::new(DEFAULT_CAPACITY, chrono::Duration::zero());
        tracer.info("run-1", "a", "x").await;
        let removed = tracer.sweep_expired().await;
        assert_eq!(removed, 1);
        assert!(tracer.read("run-1").await.is_none());
    }

    #[test]
    fn summary_counts_warnings_and_errors_separately() {
        let trace = ParseTrace {
            trace_version: TRACE_VERSION.to_string(),
            run_id: "r".to_string(),
            steps: vec![
                TraceStep {
                    at: Utc::now(),
                    stage: "a".into(),
                    message: "m".into(),
                    fields: Default::default(),
                    level: TraceLevel::Warn,
                },
                TraceStep {
                    at: Utc::now(),
                    stage: "b".into(),
                    message: "m".into(),
                    fields: Default::default(),
                    level: TraceLevel::Error,
                },
            ],
            total_recorded: 2,
        };
        let summary = TraceSummary::from(&trace);
        assert_eq!(summary.warnings, 2);
        assert_eq!(summary.errors, 1);
    }
}
