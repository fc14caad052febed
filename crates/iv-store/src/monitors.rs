// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monitor repository.

use crate::{classify, MonitorRow, Store, StoreResult};
use chrono::Utc;

/// Fields needed to create a new monitor. Auth material is expected to
/// already be encrypted by the caller (`iv-email`'s encryption boundary owns
/// that, this crate just stores the opaque blob).
#[derive(Debug, Clone)]
pub struct NewMonitor {
    /// Owning user id.
    pub user_id: i64,
    /// Monitored mailbox address.
    pub email_address: String,
    /// IMAP folder to check.
    pub mailbox_folder: String,
    /// `"password"` or `"oauth"`.
    pub auth_kind: String,
    /// Opaque, already-encrypted auth material.
    pub auth_material: String,
    /// Whether the keyword gate applies.
    pub require_invoice_keywords: bool,
}

impl Store {
    /// Create a new monitor. Fails with [`crate::StoreError::Integrity`] if
    /// `user_id` does not reference an existing user (foreign key) — the
    /// non-null check itself is enforced by the trigger before this even
    /// reaches the foreign key check.
    pub async fn create_monitor(&self, new: NewMonitor) -> StoreResult<i64> {
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO email_monitors
                (user_id, email_address, mailbox_folder, auth_kind, auth_material,
                 require_invoice_keywords, is_active, emails_processed_count,
                 invoices_created_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, 0, 0, ?, ?)
             RETURNING id",
        )
        .bind(new.user_id)
        .bind(&new.email_address)
        .bind(&new.mailbox_folder)
        .bind(&new.auth_kind)
        .bind(&new.auth_material)
        .bind(new.require_invoice_keywords)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(id)
    }

    /// Fetch a monitor by id.
    pub async fn get_monitor(&self, monitor_id: i64) -> StoreResult<Option<MonitorRow>> {
        let row = sqlx::query_as::<_, MonitorRow>("SELECT * FROM email_monitors WHERE id = ?")
            .bind(monitor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row)
    }

    /// List every active monitor, for the scheduler to fan out scheduled
    /// checks across.
    pub async fn list_active_monitors(&self) -> StoreResult<Vec<MonitorRow>> {
        let rows = sqlx::query_as::<_, MonitorRow>(
            "SELECT * FROM email_monitors WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows)
    }

    /// Apply the end-of-run counter update:
    /// `last_checked_at` is always updated; `last_error` is cleared on
    /// success and set on run-level failure; the processed/invoice counters
    /// only advance when at least one invoice was created this run.
    pub async fn apply_run_counters(
        &self,
        monitor_id: i64,
        emails_processed_delta: i64,
        invoices_created_delta: i64,
        run_level_error: Option<&str>,
    ) -> StoreResult<()> {
        let now = Utc::now();
        if invoices_created_delta > 0 {
            sqlx::query(
                "UPDATE email_monitors
                 SET emails_processed_count = emails_processed_count + ?,
                     invoices_created_count = invoices_created_count + ?,
                     last_checked_at = ?,
                     last_error = ?,
                     updated_at = ?
                 WHERE id = ?",
            )
            .bind(emails_processed_delta)
            .bind(invoices_created_delta)
            .bind(now)
            .bind(run_level_error)
            .bind(now)
            .bind(monitor_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        } else {
            sqlx::query(
                "UPDATE email_monitors
                 SET last_checked_at = ?, last_error = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(now)
            .bind(run_level_error)
            .bind(now)
            .bind(monitor_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(store: &Store) -> i64 {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, name, password_hash, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind("a@example.com")
        .bind("Admin")
        .bind("hash")
        .bind("admin")
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(store.pool())
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_monitor_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        let user_id = seed_user(&store).await;
        let id = store
            .create_monitor(NewMonitor {
                user_id,
                email_address: "invoices@acme.com".into(),
                mailbox_folder: "inbox".into(),
                auth_kind: "password".into(),
                auth_material: "enc:...".into(),
                require_invoice_keywords: true,
            })
            .await
            .unwrap();

        let monitor = store.get_monitor(id).await.unwrap().unwrap();
        assert_eq!(monitor.email_address, "invoices@acme.com");
        assert!(monitor.require_invoice_keywords);
        assert!(monitor.is_active);
    }

    #[tokio::test]
    async fn null_user_id_is_rejected_by_trigger() {
        let store = Store::open_in_memory().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO email_monitors
                (user_id, email_address, mailbox_folder, auth_kind, auth_material, created_at, updated_at)
             VALUES (NULL, 'x@y.com', 'inbox', 'password', 'x', ?, ?)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn apply_run_counters_only_advances_processed_when_invoices_created() {
        let store = Store::open_in_memory().await.unwrap();
        let user_id = seed_user(&store).await;
        let id = store
            .create_monitor(NewMonitor {
                user_id,
                email_address: "x@y.com".into(),
                mailbox_folder: "inbox".into(),
                auth_kind: "password".into(),
                auth_material: "x".into(),
                require_invoice_keywords: false,
            })
            .await
            .unwrap();

        store.apply_run_counters(id, 2, 0, None).await.unwrap();
        let monitor = store.get_monitor(id).await.unwrap().unwrap();
        assert_eq!(monitor.emails_processed_count, 0);
        assert!(monitor.last_checked_at.is_some());

        store.apply_run_counters(id, 2, 1, None).await.unwrap();
        let monitor = store.get_monitor(id).await.unwrap().unwrap();
        assert_eq!(monitor.emails_processed_count, 2);
        assert_eq!(monitor.invoices_created_count, 1);
    }
}
