// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-message processing log repository.
//!
//! Implements the dedupe lookups the check engine's gate G1 depends on: a
//! prior entry keyed by `(monitor_id, uidvalidity, uid)` with a status not in
//! `{error, skipped}` blocks reprocessing; so does a fallback match on
//! `(monitor_id, message_id)` under the same predicate. Errors and skips are
//! explicitly *not* dedupe-blocking.

use crate::{classify, ProcessingLogRow, Store, StoreResult};
use chrono::{DateTime, Utc};

/// Fields needed to record one examined message.
#[derive(Debug, Clone)]
pub struct NewProcessingLogEntry {
    /// Monitor this entry belongs to.
    pub monitor_id: i64,
    /// The check run this entry was recorded during.
    pub run_uuid: String,
    /// UIDVALIDITY observed when this message was examined.
    pub uidvalidity: i64,
    /// Mailbox UID of the message.
    pub uid: i64,
    /// `Message-Id` header.
    pub message_id: Option<String>,
    /// Message subject.
    pub subject: Option<String>,
    /// Message `From` address (text form).
    pub from_address: Option<String>,
    /// Message `Date` header.
    pub received_date: Option<DateTime<Utc>>,
    /// `found | skipped | db_ok | error`.
    pub status: String,
    /// Which gate caused a skip, if any.
    pub skip_reason: Option<String>,
    /// Number of attachments.
    pub attachment_count: i64,
    /// Number of supported attachments.
    pub attachment_supported_count: i64,
    /// Up to 10 attachment MIME types, JSON-encoded.
    pub attachment_mimes_json: Option<String>,
    /// Up to 10 attachment filenames, JSON-encoded.
    pub attachment_names_json: Option<String>,
    /// Invoices created from this message.
    pub invoices_created: i64,
    /// Wall-clock processing time for this message.
    pub processing_time_ms: Option<i64>,
    /// Error message, if `status == "error"`.
    pub error_message: Option<String>,
}

/// Statuses that do **not** block dedupe reprocessing on a later run
///.
const NON_BLOCKING_STATUSES: [&str; 2] = ["error", "skipped"];

impl Store {
    /// Insert a new processing log entry.
    pub async fn record_processing_log(&self, e: NewProcessingLogEntry) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO email_processing_log
                (monitor_id, run_uuid, uidvalidity, uid, message_id, subject, from_address,
                 received_date, status, skip_reason, attachment_count, attachment_supported_count,
                 attachment_mimes_json, attachment_names_json, invoices_created,
                 processing_time_ms, error_message, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(e.monitor_id)
        .bind(&e.run_uuid)
        .bind(e.uidvalidity)
        .bind(e.uid)
        .bind(&e.message_id)
        .bind(&e.subject)
        .bind(&e.from_address)
        .bind(e.received_date)
        .bind(&e.status)
        .bind(&e.skip_reason)
        .bind(e.attachment_count)
        .bind(e.attachment_supported_count)
        .bind(&e.attachment_mimes_json)
        .bind(&e.attachment_names_json)
        .bind(e.invoices_created)
        .bind(e.processing_time_ms)
        .bind(&e.error_message)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(id)
    }

    /// Check whether `(monitor_id, uidvalidity, uid)` was already processed
    /// by a non-blocking-excluded prior entry (gate G1, uid-keyed path).
    pub async fn is_duplicate_by_uid(
        &self,
        monitor_id: i64,
        uidvalidity: i64,
        uid: i64,
    ) -> StoreResult<bool> {
        let placeholders = NON_BLOCKING_STATUSES
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM email_processing_log
             WHERE monitor_id = ? AND uidvalidity = ? AND uid = ? AND status NOT IN ({placeholders})"
        );
        let mut q = sqlx::query_scalar::<_, i64>(&sql)
            .bind(monitor_id)
            .bind(uidvalidity)
            .bind(uid);
        for s in NON_BLOCKING_STATUSES {
            q = q.bind(s);
        }
        let count: i64 = q.fetch_one(&self.pool).await.map_err(classify)?;
        Ok(count > 0)
    }

    /// Check whether `(monitor_id, message_id)` was already processed by a
    /// non-blocking-excluded prior entry (gate G1, message-id fallback path).
    pub async fn is_duplicate_by_message_id(
        &self,
        monitor_id: i64,
        message_id: &str,
    ) -> StoreResult<bool> {
        let placeholders = NON_BLOCKING_STATUSES
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM email_processing_log
             WHERE monitor_id = ? AND message_id = ? AND status NOT IN ({placeholders})"
        );
        let mut q = sqlx::query_scalar::<_, i64>(&sql)
            .bind(monitor_id)
            .bind(message_id);
        for s in NON_BLOCKING_STATUSES {
            q = q.bind(s);
        }
        let count: i64 = q.fetch_one(&self.pool).await.map_err(classify)?;
        Ok(count > 0)
    }

    /// List the most recent processing log entries for a check run.
    pub async fn list_processing_log_by_run(
        &self,
        run_uuid: &str,
        limit: i64,
    ) -> StoreResult<Vec<ProcessingLogRow>> {
        let rows = sqlx::query_as::<_, ProcessingLogRow>(
            "SELECT * FROM email_processing_log WHERE run_uuid = ? ORDER BY id ASC LIMIT ?",
        )
        .bind(run_uuid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows)
    }

    /// List the most recent processing log entries for a monitor across all
    /// runs, newest first.
    pub async fn list_processing_log_by_monitor(
        &self,
        monitor_id: i64,
        limit: i64,
    ) -> StoreResult<Vec<ProcessingLogRow>> {
        let rows = sqlx::query_as::<_, ProcessingLogRow>(
            "SELECT * FROM email_processing_log WHERE monitor_id = ? ORDER BY id DESC LIMIT ?",
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
    use crate::check_runs::NewCheckRun;
    use crate::monitors::NewMonitor;

    async fn seed(store: &Store) -> (i64, String) {
        let user_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, name, password_hash, role, created_at, updated_at)
             VALUES ('a@b.com','A','h','admin',?,?) RETURNING id",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(store.pool())
        .await
        .unwrap();
        let monitor_id = store
            .create_monitor(NewMonitor {
                user_id,
                email_address: "m@x.com".into(),
                mailbox_folder: "inbox".into(),
                auth_kind: "password".into(),
                auth_material: "x".into(),
                require_invoice_keywords: false,
            })
            .await
            .unwrap();
        let run_uuid = "11111111-1111-1111-1111-111111111111".to_string();
        store
            .start_check_run(NewCheckRun {
                run_uuid: run_uuid.clone(),
                monitor_id,
                trigger_source: "manual".into(),
            })
            .await
            .unwrap();
        (monitor_id, run_uuid)
    }

    fn entry(monitor_id: i64, run_uuid: &str, uid: i64, status: &str) -> NewProcessingLogEntry {
        NewProcessingLogEntry {
            monitor_id,
            run_uuid: run_uuid.to_string(),
            uidvalidity: 100,
            uid,
            message_id: Some(format!("msg-{uid}")),
            subject: Some("Invoice".into()),
            from_address: Some("vendor@x.com".into()),
            received_date: Some(Utc::now()),
            status: status.to_string(),
            skip_reason: None,
            attachment_count: 1,
            attachment_supported_count: 1,
            attachment_mimes_json: None,
            attachment_names_json: None,
            invoices_created: if status == "db_ok" { 1 } else { 0 },
            processing_time_ms: Some(10),
            error_message: None,
        }
    }

    #[tokio::test]
    async fn db_ok_entry_blocks_dedupe_by_uid() {
        let store = Store::open_in_memory().await.unwrap();
        let (monitor_id, run_uuid) = seed(&store).await;
        store
            .record_processing_log(entry(monitor_id, &run_uuid, 1, "db_ok"))
            .await
            .unwrap();
        assert!(store.is_duplicate_by_uid(monitor_id, 100, 1).await.unwrap());
    }

    #[tokio::test]
    async fn error_and_skipped_entries_do_not_block_dedupe() {
        let store = Store::open_in_memory().await.unwrap();
        let (monitor_id, run_uuid) = seed(&store).await;
        store
            .record_processing_log(entry(monitor_id, &run_uuid, 2, "error"))
            .await
            .unwrap();
        store
            .record_processing_log(entry(monitor_id, &run_uuid, 3, "skipped"))
            .await
            .unwrap();
        assert!(!store.is_duplicate_by_uid(monitor_id, 100, 2).await.unwrap());
        assert!(!store.is_duplicate_by_uid(monitor_id, 100, 3).await.unwrap());
    }

    #[tokio::test]
    async fn different_uidvalidity_is_not_a_duplicate() {
        let store = Store::open_in_memory().await.unwrap();
        let (monitor_id, run_uuid) = seed(&store).await;
        store
            .record_processing_log(entry(monitor_id, &run_uuid, 1, "db_ok"))
            .await
            .unwrap();
        assert!(!store.is_duplicate_by_uid(monitor_id, 200, 1).await.unwrap());
    }

    #[tokio::test]
    async fn message_id_fallback_dedupe_works() {
        let store = Store::open_in_memory().await.unwrap();
        let (monitor_id, run_uuid) = seed(&store).await;
        store
            .record_processing_log(entry(monitor_id, &run_uuid, 1, "db_ok"))
            .await
            .unwrap();
        assert!(store
            .is_duplicate_by_message_id(monitor_id, "msg-1")
            .await
            .unwrap());
    }
}
