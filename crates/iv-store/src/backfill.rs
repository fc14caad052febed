// SPDX-License-Identifier: MIT OR Apache-2.0
//! One-time ownership backfill for rows that predate the non-null `user_id`
//! triggers (e.g. rows carried over from an import or an older export that
//! never went through [`crate::monitors::NewMonitor`] or
//! [`crate::ingestion::NewIngestionRun`]).
//!
//! The rule: an `ingestion_runs` row whose `run_id` has the shape
//! `email-<monitorId>-...` is assigned to that monitor's owner; anything else
//! (an `upload-...` run, or a `run_id` that doesn't resolve to a live
//! monitor) falls back to [`crate::users::ADMIN_USER_ID`]. Every assignment
//! is logged to `_iv_ownership_backfill_log` first, inside the same
//! transaction as the update, so a crash between the two can never produce a
//! silent, unlogged ownership change — and re-running the backfill against
//! rows it already fixed is a no-op.

use crate::users::ADMIN_USER_ID;
use crate::{classify, Store, StoreResult};
use chrono::Utc;

/// One ownership assignment made by a backfill pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillAction {
    /// The `ingestion_runs.run_id` that was assigned an owner.
    pub run_id: String,
    /// The user id it was assigned to.
    pub assigned_to: i64,
    /// `"monitor_owner"` or `"admin_fallback"`.
    pub rule: String,
}

/// Extract the monitor id from a `run_id` of the form `email-<monitorId>-...`.
fn monitor_id_from_run_id(run_id: &str) -> Option<i64> {
    let rest = run_id.strip_prefix("email-")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

impl Store {
    /// Assign an owner to every `ingestion_runs` row with a null `user_id`,
    /// logging each assignment. Returns the actions taken, empty if there was
    /// nothing to backfill.
    pub async fn backfill_ingestion_run_owners(&self) -> StoreResult<Vec<BackfillAction>> {
        let orphans: Vec<String> = sqlx::query_scalar(
            "SELECT run_id FROM ingestion_runs WHERE user_id IS NULL ORDER BY run_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        let mut actions = Vec::with_capacity(orphans.len());
        for run_id in orphans {
            let already_logged: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM _iv_ownership_backfill_log
                 WHERE table_name = 'ingestion_runs' AND row_key = ?",
            )
            .bind(&run_id)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
            if already_logged > 0 {
                continue;
            }

            let (assigned_to, rule) = match monitor_id_from_run_id(&run_id) {
                Some(monitor_id) => {
                    let owner: Option<i64> =
                        sqlx::query_scalar("SELECT user_id FROM email_monitors WHERE id = ?")
                            .bind(monitor_id)
                            .fetch_optional(&self.pool)
                            .await
                            .map_err(classify)?;
                    match owner {
                        Some(user_id) => (user_id, "monitor_owner"),
                        None => (ADMIN_USER_ID, "admin_fallback"),
                    }
                }
                None => (ADMIN_USER_ID, "admin_fallback"),
            };

            let mut tx = self.pool.begin().await.map_err(classify)?;
            sqlx::query(
                "INSERT INTO _iv_ownership_backfill_log
                    (table_name, row_key, assigned_to, rule, applied_at)
                 VALUES ('ingestion_runs', ?, ?, ?, ?)",
            )
            .bind(&run_id)
            .bind(assigned_to)
            .bind(rule)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

            sqlx::query("UPDATE ingestion_runs SET user_id = ? WHERE run_id = ?")
                .bind(assigned_to)
                .bind(&run_id)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;

            tx.commit().await.map_err(classify)?;

            actions.push(BackfillAction {
                run_id,
                assigned_to,
                rule: rule.to_string(),
            });
        }

        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(store: &Store, email: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, name, password_hash, role, created_at, updated_at)
             VALUES (?, 'N', 'h', 'admin', ?, ?) RETURNING id",
        )
        .bind(email)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(store.pool())
        .await
        .unwrap()
    }

    async fn insert_orphan_run(store: &Store, run_id: &str) {
        sqlx::query(
            "INSERT INTO ingestion_runs (run_id, user_id, status, started_at) VALUES (?, NULL, 'completed', ?)",
        )
        .bind(run_id)
        .bind(Utc::now())
        .execute(store.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn email_derived_run_id_is_assigned_to_monitor_owner() {
        let store = Store::open_in_memory().await.unwrap();
        seed_user(&store, "admin@x.com").await;
        let owner = seed_user(&store, "owner@x.com").await;
        let monitor_id = store
            .create_monitor(crate::monitors::NewMonitor {
                user_id: owner,
                email_address: "m@x.com".into(),
                mailbox_folder: "inbox".into(),
                auth_kind: "password".into(),
                auth_material: "x".into(),
                require_invoice_keywords: false,
            })
            .await
            .unwrap();

        let run_id = format!("email-{monitor_id}-1700000000-abcd");
        insert_orphan_run(&store, &run_id).await;

        let actions = store.backfill_ingestion_run_owners().await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].assigned_to, owner);
        assert_eq!(actions[0].rule, "monitor_owner");

        let run = store.get_ingestion_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.user_id, owner);
    }

    #[tokio::test]
    async fn upload_run_id_falls_back_to_admin() {
        let store = Store::open_in_memory().await.unwrap();
        seed_user(&store, "admin@x.com").await;
        let run_id = "upload-1700000000-xyz".to_string();
        insert_orphan_run(&store, &run_id).await;

        let actions = store.backfill_ingestion_run_owners().await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].assigned_to, ADMIN_USER_ID);
        assert_eq!(actions[0].rule, "admin_fallback");
    }

    #[tokio::test]
    async fn email_run_id_referencing_a_deleted_monitor_falls_back_to_admin() {
        let store = Store::open_in_memory().await.unwrap();
        seed_user(&store, "admin@x.com").await;
        let run_id = "email-999-1700000000-abcd".to_string();
        insert_orphan_run(&store, &run_id).await;

        let actions = store.backfill_ingestion_run_owners().await.unwrap();
        assert_eq!(actions[0].assigned_to, ADMIN_USER_ID);
        assert_eq!(actions[0].rule, "admin_fallback");
    }

    #[tokio::test]
    async fn rerunning_backfill_is_a_no_op() {
        let store = Store::open_in_memory().await.unwrap();
        seed_user(&store, "admin@x.com").await;
        let run_id = "upload-1-a".to_string();
        insert_orphan_run(&store, &run_id).await;

        let first = store.backfill_ingestion_run_owners().await.unwrap();
        assert_eq!(first.len(), 1);

        // user_id is no longer null, so the second pass finds nothing to do,
        // even though the log row from the first pass is also still there.
        let second = store.backfill_ingestion_run_owners().await.unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn monitor_id_from_run_id_parses_and_rejects() {
        assert_eq!(monitor_id_from_run_id("email-42-123-abc"), Some(42));
        assert_eq!(monitor_id_from_run_id("upload-123-abc"), None);
        assert_eq!(monitor_id_from_run_id("email-"), None);
    }
}
