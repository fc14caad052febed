// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monitor lock repository.
//!
//! The protocol is exactly three steps: delete expired locks, attempt an
//! atomic insert, and treat a primary-key conflict as `Locked`. Both steps
//! run inside one transaction so a concurrent acquisition attempt can never
//! observe the gap between the delete and the insert.

use crate::{classify, MonitorLockRow, Store, StoreResult};
use chrono::{DateTime, Duration, Utc};

/// Default lock lease.
pub const DEFAULT_LEASE: Duration = Duration::minutes(5);

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock.
    Acquired,
    /// Another run already holds the lock.
    Locked,
}

impl Store {
    /// Attempt to acquire the lock for `monitor_id` on behalf of `owner`.
    ///
    /// Sweeps expired locks first, then attempts an insert, atomically; a
    /// primary-key conflict means another run currently holds it.
    pub async fn acquire_monitor_lock(
        &self,
        monitor_id: i64,
        owner: &str,
    ) -> StoreResult<AcquireOutcome> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        let now = Utc::now();

        sqlx::query("DELETE FROM email_monitor_locks WHERE lock_expires_at < ?")
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let expires_at = now + DEFAULT_LEASE;
        let insert = sqlx::query(
            "INSERT INTO email_monitor_locks (monitor_id, owner, locked_at, lock_expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(monitor_id)
        .bind(owner)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;

        let outcome = match insert {
            Ok(_) => AcquireOutcome::Acquired,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                AcquireOutcome::Locked
            }
            Err(e) => return Err(classify(e)),
        };

        tx.commit().await.map_err(classify)?;
        Ok(outcome)
    }

    /// Release a lock. The finalizer calls this in every exit path (success
    /// or failure) so a run never leaves the monitor permanently locked
    /// short of the 5-minute expiry backstop.
    pub async fn release_monitor_lock(&self, monitor_id: i64, owner: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM email_monitor_locks WHERE monitor_id = ? AND owner = ?")
            .bind(monitor_id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    /// Inspect the current lock holder for a monitor, if any (diagnostics).
    pub async fn get_monitor_lock(&self, monitor_id: i64) -> StoreResult<Option<MonitorLockRow>> {
        let row = sqlx::query_as::<_, MonitorLockRow>(
            "SELECT * FROM email_monitor_locks WHERE monitor_id = ?",
        )
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row)
    }
}

/// `true` when `expires_at` is in the past relative to `now`. Exposed for
/// callers composing their own sweep logic without a round trip.
#[must_use]
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at < now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquisition_is_locked_until_first_releases() {
        let store = Store::open_in_memory().await.unwrap();
        let first = store.acquire_monitor_lock(1, "run-a").await.unwrap();
        assert_eq!(first, AcquireOutcome::Acquired);

        let second = store.acquire_monitor_lock(1, "run-b").await.unwrap();
        assert_eq!(second, AcquireOutcome::Locked);

        store.release_monitor_lock(1, "run-a").await.unwrap();
        let third = store.acquire_monitor_lock(1, "run-b").await.unwrap();
        assert_eq!(third, AcquireOutcome::Acquired);
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimed_on_next_attempt() {
        let store = Store::open_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO email_monitor_locks (monitor_id, owner, locked_at, lock_expires_at)
             VALUES (1, 'stale', ?, ?)",
        )
        .bind(Utc::now() - Duration::minutes(10))
        .bind(Utc::now() - Duration::minutes(5))
        .execute(store.pool())
        .await
        .unwrap();

        let outcome = store.acquire_monitor_lock(1, "fresh").await.unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired);
    }

    #[tokio::test]
    async fn different_monitors_do_not_contend() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(
            store.acquire_monitor_lock(1, "a").await.unwrap(),
            AcquireOutcome::Acquired
        );
        assert_eq!(
            store.acquire_monitor_lock(2, "b").await.unwrap(),
            AcquireOutcome::Acquired
        );
    }

    #[test]
    fn is_expired_compares_correctly() {
        let now = Utc::now();
        assert!(is_expired(now - Duration::seconds(1), now));
        assert!(!is_expired(now + Duration::seconds(1), now));
    }
}
