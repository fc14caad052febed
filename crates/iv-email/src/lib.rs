// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Email check engine: per-monitor locked check runs, mailbox open, dedupe, gates, trace persistence."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Orchestrates one [`CheckEngine::check`] run: acquire the monitor lock,
//! open the mailbox, search and fetch messages, run each through the
//! ordered per-message gates (dedupe, attachment, keyword, extraction), and
//! persist the check run plus per-message processing log entries. Stage
//! transitions are strictly monotonic; the lock is released in every exit
//! path via an RAII-style `finally` block (see [`finalize`]).

pub mod crypto;
pub mod gates;
pub mod oauth;
pub mod stage;

pub use stage::{CheckTrigger, STAGES};

use chrono::Utc;
use iv_config::PipelineConfig;
use iv_core::{SourceRef, SourceRefKind, SourceType};
use iv_error::{ErrorCode, IvError, IvResult};
use iv_extraction::{extract, ExtractionInput};
use iv_mailbox::{Attachment, FetchedMessage, ImapCredentials};
use iv_proc::ProcRunner;
use iv_store::{
    CheckRunFinalization, NewCheckRun, NewIngestionRun, NewInvoiceItem, NewParseTrace,
    NewProcessingLogEntry, Store,
};
use iv_tracer::{TraceLevel, TraceSummary, Tracer};
use oauth::OAuthRefresher;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

const DEFAULT_SINCE_DAYS: u32 = 7;
const DEFAULT_LIMIT: usize = 50;
const DEFAULT_FOLDER: &str = "inbox";
const IMAP_PORT: u16 = 993;

/// Options accepted by [`CheckEngine::check`] and [`CheckEngine::diagnose`].
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// How many days back the `SINCE` search should cover.
    pub since_days: u32,
    /// Max messages fetched this run (the most recent `limit` UIDs).
    pub limit: usize,
    /// Overrides the monitor's configured folder, if set.
    pub folder: Option<String>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            since_days: DEFAULT_SINCE_DAYS,
            limit: DEFAULT_LIMIT,
            folder: None,
        }
    }
}

/// Per-message outcome surfaced back to the caller alongside the run summary.
#[derive(Debug, Clone)]
pub struct EmailDetail {
    /// Mailbox UID.
    pub uid: u32,
    /// Subject line, if present.
    pub subject: Option<String>,
    /// `found | skipped | db_ok | error`.
    pub status: String,
    /// Gate that caused a skip, if any.
    pub skip_reason: Option<String>,
    /// Invoices created from this message.
    pub invoices_created: u32,
}

/// Result of a [`CheckEngine::check`] (or [`CheckEngine::diagnose`]) call.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Server-generated run identifier.
    pub run_uuid: String,
    /// Furthest stage reached.
    pub stage: &'static str,
    /// `true` unless the run finalized with `status=error`.
    pub success: bool,
    /// Messages found by the search.
    pub found: u32,
    /// Messages fetched.
    pub fetched: u32,
    /// Messages that completed the pipeline.
    pub processed: u32,
    /// Messages skipped by a gate.
    pub skipped: u32,
    /// Invoices created this run.
    pub invoices_created: u32,
    /// Per-message errors.
    pub errors: u32,
    /// Per-message detail, in fetch order.
    pub email_details: Vec<EmailDetail>,
    /// Total wall-clock time for the run.
    pub total_time_ms: u64,
    /// Run-level error message, if `success` is `false`.
    pub error: Option<String>,
}

/// Orchestrates check runs against monitors: locking, mailbox I/O, gates,
/// extraction, and persistence.
pub struct CheckEngine {
    store: Store,
    tracer: Tracer,
    proc: ProcRunner,
    config: PipelineConfig,
    oauth: Option<Arc<dyn OAuthRefresher>>,
}

impl CheckEngine {
    /// Build an engine around a store, tracer, and config. `oauth` is
    /// consulted only for monitors whose `auth_kind` is `"oauth"`.
    #[must_use]
    pub fn new(
        store: Store,
        tracer: Tracer,
        proc: ProcRunner,
        config: PipelineConfig,
        oauth: Option<Arc<dyn OAuthRefresher>>,
    ) -> Self {
        Self {
            store,
            tracer,
            proc,
            config,
            oauth,
        }
    }

    /// Run a full check against `monitor_id`, writing dedupe state and
    /// counters. See [`CheckEngine::diagnose`] for the read-only variant.
    pub async fn check(
        &self,
        monitor_id: i64,
        trigger: CheckTrigger,
        opts: CheckOptions,
    ) -> IvResult<CheckResult> {
        self.run(monitor_id, trigger, opts, RunMode::Write).await
    }

    /// Read-only variant: never writes dedupe state (processing log rows
    /// are still written so operators can see the reasoning, but prior
    /// entries are never consulted for the dedupe gate when
    /// `bypass_dedupe` is set) and optionally bypasses the keyword filter.
    /// Intended for an operator-facing "why would this message be
    /// skipped" view.
    pub async fn diagnose(
        &self,
        monitor_id: i64,
        opts: CheckOptions,
        bypass_keywords: bool,
        bypass_dedupe: bool,
    ) -> IvResult<CheckResult> {
        self.run(
            monitor_id,
            CheckTrigger::Manual,
            opts,
            RunMode::Diagnose {
                bypass_keywords,
                bypass_dedupe,
            },
        )
        .await
    }

    /// History reader: most recent check runs for a monitor.
    pub async fn list_check_runs(
        &self,
        monitor_id: i64,
        limit: i64,
    ) -> IvResult<Vec<iv_store::CheckRunRow>> {
        self.store.list_check_runs(monitor_id, limit).await.map_err(Into::into)
    }

    /// History reader: most recent processing log entries for a check run.
    pub async fn list_processing_logs_for_run(
        &self,
        run_uuid: &str,
        limit: i64,
    ) -> IvResult<Vec<iv_store::ProcessingLogRow>> {
        self.store
            .list_processing_log_by_run(run_uuid, limit)
            .await
            .map_err(Into::into)
    }

    /// History reader: most recent processing log entries for a monitor
    /// across all runs.
    pub async fn list_processing_logs_for_monitor(
        &self,
        monitor_id: i64,
        limit: i64,
    ) -> IvResult<Vec<iv_store::ProcessingLogRow>> {
        self.store
            .list_processing_log_by_monitor(monitor_id, limit)
            .await
            .map_err(Into::into)
    }

    async fn run(
        &self,
        monitor_id: i64,
        trigger: CheckTrigger,
        opts: CheckOptions,
        mode: RunMode,
    ) -> IvResult<CheckResult> {
        let started = Instant::now();
        let run_uuid = Uuid::new_v4().to_string();
        let owner = format!("run-{run_uuid}");

        self.tracer
            .info(&run_uuid, "init", "check run starting")
            .await;

        let monitor = self
            .store
            .get_monitor(monitor_id)
            .await?
            .ok_or_else(|| IvError::new(ErrorCode::NotFound, "no such monitor").with_context("monitor_id", monitor_id))?;

        if !monitor.is_active {
            return Err(IvError::new(ErrorCode::Inactive, "monitor is disabled")
                .with_context("monitor_id", monitor_id));
        }

        let lock_held = !mode.is_diagnose();
        if lock_held {
            match self.store.acquire_monitor_lock(monitor_id, &owner).await? {
                iv_store::AcquireOutcome::Acquired => {}
                iv_store::AcquireOutcome::Locked => {
                    return Err(IvError::new(ErrorCode::Locked, "another run holds the monitor lock")
                        .with_context("monitor_id", monitor_id));
                }
            }
        }

        let outcome = self
            .run_locked(&run_uuid, monitor_id, &monitor, trigger, opts, &mode)
            .await;

        if lock_held {
            if let Err(e) = self.store.release_monitor_lock(monitor_id, &owner).await {
                warn!(monitor_id, run_uuid = %run_uuid, error = %e, "failed to release monitor lock");
            }
        }

        let total_time_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut result) => {
                result.total_time_ms = total_time_ms;
                if !mode.is_diagnose() {
                    self.persist_trace(&run_uuid, total_time_ms).await;
                }
                Ok(result)
            }
            Err((stage, err)) => {
                error!(monitor_id, run_uuid = %run_uuid, stage, error = %err, "check run failed");
                self.tracer.error(&run_uuid, stage, err.message.clone()).await;
                if !mode.is_diagnose() {
                    self.store
                        .finalize_check_run(
                            &run_uuid,
                            CheckRunFinalization {
                                status: "error".to_string(),
                                last_stage: stage.to_string(),
                                error_message: Some(err.message.clone()),
                                ..Default::default()
                            },
                        )
                        .await
                        .ok();
                    self.store
                        .apply_run_counters(monitor_id, 0, 0, Some(&err.message))
                        .await
                        .ok();
                    self.persist_trace(&run_uuid, total_time_ms).await;
                }
                Ok(CheckResult {
                    run_uuid,
                    stage,
                    success: false,
                    found: 0,
                    fetched: 0,
                    processed: 0,
                    skipped: 0,
                    invoices_created: 0,
                    errors: 0,
                    email_details: Vec::new(),
                    total_time_ms,
                    error: Some(err.message),
                })
            }
        }
    }

    async fn run_locked(
        &self,
        run_uuid: &str,
        monitor_id: i64,
        monitor: &iv_store::MonitorRow,
        trigger: CheckTrigger,
        opts: CheckOptions,
        mode: &RunMode,
    ) -> Result<CheckResult, (&'static str, IvError)> {
        if !mode.is_diagnose() {
            self.store
                .start_check_run(NewCheckRun {
                    run_uuid: run_uuid.to_string(),
                    monitor_id,
                    trigger_source: trigger.as_str().to_string(),
                })
                .await
                .map_err(|e| ("init", e.into()))?;
        }

        self.advance(run_uuid, "config", mode).await;
        let creds = self.resolve_credentials(monitor).await.map_err(|e| ("config", e))?;

        self.advance(run_uuid, "connect", mode).await;
        let mut session = iv_mailbox::connect(&creds)
            .await
            .map_err(|e| ("connect", e))?;

        self.advance(run_uuid, "open_folder", mode).await;
        let folder = opts
            .folder
            .clone()
            .unwrap_or_else(|| monitor.mailbox_folder.clone());
        let opened = session
            .open_folder(&folder)
            .await
            .map_err(|e| ("open_folder", e))?;
        self.tracer
            .record(
                run_uuid,
                "open_folder",
                "folder opened",
                TraceLevel::Info,
                json!({ "folder": folder, "uidvalidity": opened.uidvalidity }).as_object().unwrap().clone(),
            )
            .await;

        self.advance(run_uuid, "search", mode).await;
        let since = Utc::now().date_naive() - chrono::Duration::days(opts.since_days as i64);
        let search_query = format!("SINCE {}", since.format("%d-%b-%Y"));
        let uids = session
            .search_since(since, opts.limit)
            .await
            .map_err(|e| ("search", e))?;
        let found = uids.len() as u32;

        self.advance(run_uuid, "fetch", mode).await;
        let messages = session
            .fetch_messages(&uids)
            .await
            .map_err(|e| ("fetch", e))?;
        let fetched = messages.len() as u32;
        session.logout().await.ok();

        self.advance(run_uuid, "process", mode).await;
        let mut processed = 0u32;
        let mut skipped = 0u32;
        let mut errors = 0u32;
        let mut invoices_created = 0u32;
        let mut attachments_total = 0i64;
        let mut attachments_supported = 0i64;
        let mut details = Vec::with_capacity(messages.len());

        for message in &messages {
            let msg_started = Instant::now();
            let outcome = self
                .process_message(run_uuid, monitor, opened.uidvalidity, message, mode)
                .await;
            let elapsed_ms = msg_started.elapsed().as_millis() as i64;

            attachments_total += message.attachments.len() as i64;
            attachments_supported += message
                .attachments
                .iter()
                .filter(|a| is_supported(a))
                .count() as i64;

            let (status, skip_reason, invoices, error_message) = match &outcome {
                MessageOutcome::Processed { invoices } => {
                    processed += 1;
                    invoices_created += invoices;
                    ("db_ok", None, *invoices, None)
                }
                MessageOutcome::Skipped { reason } => {
                    skipped += 1;
                    ("skipped", Some(reason.clone()), 0, None)
                }
                MessageOutcome::Errored { message: err_msg } => {
                    errors += 1;
                    ("error", None, 0, Some(err_msg.clone()))
                }
            };

            if !mode.is_diagnose() {
                self.store
                    .record_processing_log(NewProcessingLogEntry {
                        monitor_id,
                        run_uuid: run_uuid.to_string(),
                        uidvalidity: opened.uidvalidity as i64,
                        uid: message.uid as i64,
                        message_id: message.message_id.clone(),
                        subject: message.subject.clone(),
                        from_address: message.from_address.clone(),
                        received_date: message.received_date,
                        status: status.to_string(),
                        skip_reason: skip_reason.clone(),
                        attachment_count: message.attachments.len() as i64,
                        attachment_supported_count: message
                            .attachments
                            .iter()
                            .filter(|a| is_supported(a))
                            .count() as i64,
                        attachment_mimes_json: Some(truncated_json_list(
                            message.attachments.iter().map(|a| a.mime_type.clone()),
                        )),
                        attachment_names_json: Some(truncated_json_list(
                            message.attachments.iter().filter_map(|a| a.filename.clone()),
                        )),
                        invoices_created: invoices as i64,
                        processing_time_ms: Some(elapsed_ms),
                        error_message: error_message.clone(),
                    })
                    .await
                    .map_err(|e| ("process", e.into()))?;
            }

            details.push(EmailDetail {
                uid: message.uid,
                subject: message.subject.clone(),
                status: status.to_string(),
                skip_reason,
                invoices_created: invoices,
            });
        }

        self.advance(run_uuid, "complete", mode).await;

        let status = if errors > 0 && processed > 0 {
            "partial"
        } else if errors > 0 && processed == 0 {
            "error"
        } else {
            "success"
        };

        if !mode.is_diagnose() {
            self.store
                .finalize_check_run(
                    run_uuid,
                    CheckRunFinalization {
                        status: status.to_string(),
                        last_stage: "complete".to_string(),
                        folder: Some(folder.clone()),
                        uidvalidity: Some(opened.uidvalidity as i64),
                        search_query: Some(search_query),
                        found_count: found as i64,
                        fetched_count: fetched as i64,
                        attachments_total,
                        attachments_supported,
                        emails_skipped: skipped as i64,
                        emails_processed: processed as i64,
                        invoices_created: invoices_created as i64,
                        errors_count: errors as i64,
                        stage_timings_json: None,
                        error_message: None,
                    },
                )
                .await
                .map_err(|e| ("complete", e.into()))?;

            let run_level_error = if status == "error" {
                Some("all processed messages failed".to_string())
            } else {
                None
            };
            self.store
                .apply_run_counters(
                    monitor_id,
                    processed as i64,
                    invoices_created as i64,
                    run_level_error.as_deref(),
                )
                .await
                .map_err(|e| ("complete", e.into()))?;
        }

        Ok(CheckResult {
            run_uuid: run_uuid.to_string(),
            stage: "complete",
            success: status != "error",
            found,
            fetched,
            processed,
            skipped,
            invoices_created,
            errors,
            email_details: details,
            total_time_ms: 0,
            error: None,
        })
    }

    async fn process_message(
        &self,
        run_uuid: &str,
        monitor: &iv_store::MonitorRow,
        uidvalidity: u32,
        message: &FetchedMessage,
        mode: &RunMode,
    ) -> MessageOutcome {
        let bypass_dedupe = mode.bypass_dedupe();
        let bypass_keywords = mode.bypass_keywords();

        // G1: dedupe
        if !bypass_dedupe {
            let uid_dup = self
                .store
                .is_duplicate_by_uid(monitor.id, uidvalidity as i64, message.uid as i64)
                .await
                .unwrap_or(false);
            if uid_dup {
                return MessageOutcome::Skipped {
                    reason: "already_processed_uid_match".to_string(),
                };
            }
            if let Some(mid) = &message.message_id {
                if self
                    .store
                    .is_duplicate_by_message_id(monitor.id, mid)
                    .await
                    .unwrap_or(false)
                {
                    return MessageOutcome::Skipped {
                        reason: "already_processed_message_id_match".to_string(),
                    };
                }
            }
        }

        // G2: has attachment
        if message.attachments.is_empty() {
            return MessageOutcome::Skipped {
                reason: "no_attachments".to_string(),
            };
        }

        // G3: at least one supported attachment
        let supported: Vec<&Attachment> = message.attachments.iter().filter(|a| is_supported(a)).collect();
        if supported.is_empty() {
            return MessageOutcome::Skipped {
                reason: "unsupported_attachment_types".to_string(),
            };
        }

        // G4: keyword gate
        if monitor.require_invoice_keywords && !bypass_keywords {
            let haystack = format!(
                "{} {} {}",
                message.subject.clone().unwrap_or_default(),
                message
                    .attachments
                    .iter()
                    .filter_map(|a| a.filename.clone())
                    .collect::<Vec<_>>()
                    .join(" "),
                message.from_address.clone().unwrap_or_default(),
            );
            if !gates::passes_keyword_gate(&haystack) {
                return MessageOutcome::Skipped {
                    reason: "keyword_filter_miss".to_string(),
                };
            }
        }

        // G5: extraction
        let mut invoices = 0u32;
        for attachment in &supported {
            match self.extract_and_persist(run_uuid, monitor, message, attachment).await {
                Ok(()) => invoices += 1,
                Err(e) => {
                    return MessageOutcome::Errored {
                        message: e.message,
                    }
                }
            }
        }
        MessageOutcome::Processed { invoices }
    }

    async fn extract_and_persist(
        &self,
        run_uuid: &str,
        monitor: &iv_store::MonitorRow,
        message: &FetchedMessage,
        attachment: &Attachment,
    ) -> IvResult<()> {
        let input = ExtractionInput {
            bytes: attachment.bytes.clone(),
            source_type: SourceType::Email,
            source_ref: SourceRef {
                kind: SourceRefKind::MessageId,
                value: message.message_id.clone(),
                mime_type: Some(attachment.mime_type.clone()),
            },
            vendor_hint: None,
        };
        let output = extract(&self.proc, input).await?;

        self.tracer
            .record(
                run_uuid,
                "process.extract",
                "attachment extracted",
                TraceLevel::Info,
                json!({
                    "filename": attachment.filename,
                    "combined_confidence": output.combined_confidence,
                })
                .as_object()
                .unwrap()
                .clone(),
            )
            .await;

        let ingestion_run_id = format!(
            "email-{}-{}-{:x}",
            monitor.id,
            Utc::now().timestamp_millis(),
            rand::random::<u32>()
        );
        self.store
            .create_ingestion_run(NewIngestionRun {
                run_id: ingestion_run_id.clone(),
                user_id: monitor.user_id,
                account: Some(monitor.email_address.clone()),
                file_name: attachment.filename.clone(),
                file_size: Some(attachment.bytes.len() as i64),
            })
            .await?;

        let invoice = &output.build.invoice;
        let items: Vec<NewInvoiceItem> = invoice
            .line_items
            .iter()
            .map(|li| NewInvoiceItem {
                description: li
                    .normalized_description
                    .clone()
                    .unwrap_or_else(|| li.raw_description.clone()),
                quantity: li.quantity,
                unit_price_cents: li.unit_price.as_ref().map(iv_core::Money::cents),
                total_cents: li.total_price.as_ref().map(iv_core::Money::cents),
                category: li.attributes.get("category").and_then(|v| v.as_str()).map(str::to_string),
            })
            .collect();

        let vendor_name = Some(invoice.parties.vendor.name.clone()).filter(|n| !n.is_empty());
        let total_cents = invoice.totals.invoice_total.as_ref().map(iv_core::Money::cents);

        self.store
            .complete_ingestion_run(&ingestion_run_id, vendor_name.as_deref(), total_cents, &items)
            .await?;

        Ok(())
    }

    async fn resolve_credentials(&self, monitor: &iv_store::MonitorRow) -> IvResult<ImapCredentials> {
        let host = monitor
            .email_address
            .split('@')
            .nth(1)
            .map(|domain| format!("imap.{domain}"))
            .ok_or_else(|| IvError::new(ErrorCode::InvalidInput, "monitor email address has no domain"))?;

        let password = match monitor.auth_kind.as_str() {
            "oauth" => {
                let key = self.encryption_key()?;
                let refresh_token = crypto::decrypt(&key, &monitor.auth_material)?;
                let refresher = self.oauth.as_ref().ok_or_else(|| {
                    IvError::new(ErrorCode::AuthFailed, "monitor is oauth but no refresher is configured")
                })?;
                let refreshed = tokio::time::timeout(
                    std::time::Duration::from_secs(15),
                    refresher.refresh(&refresh_token),
                )
                .await
                .map_err(|_| IvError::new(ErrorCode::Unreachable, "oauth token refresh timed out"))??;
                refreshed.access_token
            }
            _ => {
                let key = self.encryption_key()?;
                crypto::decrypt(&key, &monitor.auth_material)?
            }
        };

        Ok(ImapCredentials {
            host,
            port: IMAP_PORT,
            username: monitor.email_address.clone(),
            password,
        })
    }

    fn encryption_key(&self) -> IvResult<[u8; 32]> {
        let raw = self.config.email_encryption_key.as_deref().ok_or_else(|| {
            IvError::new(ErrorCode::AuthFailed, "EMAIL_ENCRYPTION_KEY is not configured")
        })?;
        Ok(crypto::derive_key(raw))
    }

    async fn advance(&self, run_uuid: &str, stage: &'static str, mode: &RunMode) {
        self.tracer.info(run_uuid, stage, "stage advanced").await;
        if !mode.is_diagnose() {
            self.store.advance_check_run_stage(run_uuid, stage).await.ok();
        }
    }

    async fn persist_trace(&self, run_uuid: &str, duration_ms: u64) {
        if !self.config.features.parse_tracing {
            return;
        }
        let Some(trace) = self.tracer.read(run_uuid).await else {
            return;
        };
        let summary = TraceSummary::from(&trace);
        let Ok(trace_json) = serde_json::to_string(&trace) else {
            return;
        };
        let Ok(summary_json) = serde_json::to_string(&summary) else {
            return;
        };
        if let Err(e) = self
            .store
            .persist_parse_trace(NewParseTrace {
                run_id: run_uuid.to_string(),
                user_id: None,
                duration_ms: duration_ms as i64,
                step_count: summary.step_count as i64,
                warnings: summary.warnings as i64,
                errors: summary.errors as i64,
                trace_json,
                summary_json,
            })
            .await
        {
            warn!(run_uuid, error = %e, "failed to persist parse trace (non-fatal)");
        }
    }
}

enum MessageOutcome {
    Processed { invoices: u32 },
    Skipped { reason: String },
    Errored { message: String },
}

enum RunMode {
    Write,
    Diagnose {
        bypass_keywords: bool,
        bypass_dedupe: bool,
    },
}

impl RunMode {
    fn is_diagnose(&self) -> bool {
        matches!(self, Self::Diagnose { .. })
    }
    fn bypass_keywords(&self) -> bool {
        matches!(self, Self::Diagnose { bypass_keywords: true, .. })
    }
    fn bypass_dedupe(&self) -> bool {
        matches!(self, Self::Diagnose { bypass_dedupe: true, .. })
    }
}

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heic", "heif",
];

/// Full attachment support policy: a supported MIME type is always
/// sufficient; otherwise a supported filename extension is sufficient even
/// under a generic `application/octet-stream` MIME type, and finally an
/// octet-stream attachment with an invoice-suggestive filename (matching the
/// same patterns the keyword gate uses) is accepted.
fn is_supported(attachment: &Attachment) -> bool {
    if gates::is_supported_attachment(&attachment.mime_type) {
        return true;
    }
    let Some(filename) = &attachment.filename else {
        return false;
    };
    let lower = filename.to_ascii_lowercase();
    if SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{ext}"))) {
        return true;
    }
    if attachment.mime_type == "application/octet-stream" && gates::passes_keyword_gate(&lower) {
        return true;
    }
    false
}

fn truncated_json_list(values: impl Iterator<Item = String>) -> String {
    let list: Vec<String> = values.take(10).collect();
    serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octet_stream_with_invoice_filename_is_supported() {
        let a = Attachment {
            filename: Some("bill-01.pdf".to_string()),
            mime_type: "application/octet-stream".to_string(),
            bytes: Vec::new(),
        };
        assert!(is_supported(&a));
    }

    #[test]
    fn zip_is_never_supported() {
        let a = Attachment {
            filename: Some("archive.zip".to_string()),
            mime_type: "application/zip".to_string(),
            bytes: Vec::new(),
        };
        assert!(!is_supported(&a));
    }

    #[test]
    fn extension_allow_list_overrides_generic_mime() {
        let a = Attachment {
            filename: Some("scan.heic".to_string()),
            mime_type: "application/octet-stream".to_string(),
            bytes: Vec::new(),
        };
        assert!(is_supported(&a));
    }
}
