// SPDX-License-Identifier: MIT OR Apache-2.0
//! Row types for every table in the column contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored email account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonitorRow {
    /// Monitor primary key.
    pub id: i64,
    /// Owning user id (non-null, enforced by trigger).
    pub user_id: i64,
    /// The monitored mailbox's email address.
    pub email_address: String,
    /// IMAP folder to check, default `"inbox"`.
    pub mailbox_folder: String,
    /// `"password"` or `"oauth"`.
    pub auth_kind: String,
    /// Opaque, encrypted-at-rest auth material blob.
    pub auth_material: String,
    /// Whether G4's keyword gate applies.
    pub require_invoice_keywords: bool,
    /// Whether the monitor is active (inactive monitors fail `check()` with
    /// `Inactive`).
    pub is_active: bool,
    /// Cumulative count of emails that produced at least one invoice.
    pub emails_processed_count: i64,
    /// Cumulative count of invoices created.
    pub invoices_created_count: i64,
    /// Timestamp of the most recent check run against this monitor.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Most recent run-level error message, cleared on success.
    pub last_error: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Row last-update time.
    pub updated_at: DateTime<Utc>,
}

/// A single check run execution.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckRunRow {
    /// Server-generated UUID identifying this run.
    pub run_uuid: String,
    /// Monitor this run was executed against.
    pub monitor_id: i64,
    /// `"manual"` or `"scheduled"`.
    pub trigger_source: String,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run finalized, if it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal status: `started | success | partial | error`.
    pub status: String,
    /// Furthest stage reached: a prefix of the fixed stage sequence.
    pub last_stage: String,
    /// Folder that was opened, once known.
    pub folder: Option<String>,
    /// UIDVALIDITY observed at mailbox-open time.
    pub uidvalidity: Option<i64>,
    /// The `SINCE <date>` search query string that was executed.
    pub search_query: Option<String>,
    /// Messages found by the search.
    pub found_count: i64,
    /// Messages successfully fetched.
    pub fetched_count: i64,
    /// Total attachments seen across fetched messages.
    pub attachments_total: i64,
    /// Attachments recognized as a supported type.
    pub attachments_supported: i64,
    /// Messages skipped by a gate.
    pub emails_skipped: i64,
    /// Messages that completed the pipeline.
    pub emails_processed: i64,
    /// Invoices created during this run.
    pub invoices_created: i64,
    /// Per-message errors encountered (non-fatal to the run).
    pub errors_count: i64,
    /// JSON-encoded per-stage timing map.
    pub stage_timings_json: Option<String>,
    /// Run-level error message, if the run failed outright.
    pub error_message: Option<String>,
}

/// One processed (or skipped) message.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessingLogRow {
    /// Row id.
    pub id: i64,
    /// Monitor this entry belongs to.
    pub monitor_id: i64,
    /// The check run this entry was recorded during.
    pub run_uuid: String,
    /// UIDVALIDITY observed when this message was examined.
    pub uidvalidity: i64,
    /// Mailbox UID of the message.
    pub uid: i64,
    /// `Message-Id` header, used as the dedupe fallback key.
    pub message_id: Option<String>,
    /// Message subject.
    pub subject: Option<String>,
    /// Message `From` address (text form).
    pub from_address: Option<String>,
    /// Message `Date` header.
    pub received_date: Option<DateTime<Utc>>,
    /// `found | skipped | db_ok | error`.
    pub status: String,
    /// Which gate caused a skip, if `status == "skipped"`.
    pub skip_reason: Option<String>,
    /// Number of attachments on the message.
    pub attachment_count: i64,
    /// Number of attachments recognized as supported.
    pub attachment_supported_count: i64,
    /// JSON array of up to 10 attachment MIME types.
    pub attachment_mimes_json: Option<String>,
    /// JSON array of up to 10 attachment filenames.
    pub attachment_names_json: Option<String>,
    /// Invoices created from this message.
    pub invoices_created: i64,
    /// Wall-clock processing time for this message.
    pub processing_time_ms: Option<i64>,
    /// Error message, if `status == "error"`.
    pub error_message: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// An advisory per-monitor mutex.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonitorLockRow {
    /// The locked monitor (primary key ⇒ at most one holder).
    pub monitor_id: i64,
    /// Opaque token identifying the lock holder.
    pub owner: String,
    /// When the lock was acquired.
    pub locked_at: DateTime<Utc>,
    /// When the lock expires and becomes reclaimable.
    pub lock_expires_at: DateTime<Utc>,
}

/// One invoice extraction instance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestionRunRow {
    /// `email-<monitor>-<ts>-<rand>` or `upload-<ts>-<rand>`.
    pub run_id: String,
    /// Owning user id (non-null, enforced by trigger).
    pub user_id: i64,
    /// Free-form account label.
    pub account: Option<String>,
    /// Detected vendor name, if any.
    pub vendor: Option<String>,
    /// Original filename of the ingested document.
    pub file_name: Option<String>,
    /// File size in bytes.
    pub file_size: Option<i64>,
    /// `processing | completed | failed`.
    pub status: String,
    /// Final invoice total, in integer cents.
    pub invoice_total_cents: Option<i64>,
    /// When processing began.
    pub started_at: DateTime<Utc>,
    /// When processing finished.
    pub finished_at: Option<DateTime<Utc>>,
}

/// A single extracted invoice line.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceItemRow {
    /// Row id.
    pub id: i64,
    /// Owning ingestion run.
    pub run_id: String,
    /// Line item description.
    pub description: String,
    /// Quantity (defaults to `1` when absent but a description exists).
    pub quantity: f64,
    /// Per-unit price, in integer cents.
    pub unit_price_cents: Option<i64>,
    /// Extended line total, in integer cents.
    pub total_cents: Option<i64>,
    /// Category hint (meat/seafood/produce/dairy/beverage/dry goods/frozen).
    pub category: Option<String>,
}

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    /// Row id; `1` is reserved as the admin backfill target.
    pub id: i64,
    /// Unique login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Hashed password (never the plaintext).
    pub password_hash: String,
    /// `admin | manager | rep | viewer | customer_admin`.
    pub role: String,
    /// Account/org label, if applicable.
    pub account_name: Option<String>,
    /// Whether the account can log in.
    pub is_active: bool,
    /// Whether the email address has been verified.
    pub is_email_verified: bool,
    /// Consecutive failed login attempts.
    pub failed_login_attempts: i64,
    /// Lockout expiry, if currently locked out.
    pub locked_until: Option<DateTime<Utc>>,
    /// Timestamp of the most recent successful login.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Source IP of the most recent successful login.
    pub last_login_ip: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Row last-update time.
    pub updated_at: DateTime<Utc>,
}

/// A persisted, best-effort mirror of an in-memory [`iv_tracer::ParseTrace`]
///.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParseTraceRow {
    /// Row id.
    pub id: i64,
    /// The run this trace belongs to (unique).
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
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}
