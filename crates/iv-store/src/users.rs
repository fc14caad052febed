// SPDX-License-Identifier: MIT OR Apache-2.0
//! User repository.
//!
//! Authentication/JWT itself is out of scope; this crate only
//! owns the row, not the login flow. `id = 1` is reserved as the admin
//! fallback owner for the ownership backfill (see `backfill.rs`).

use crate::{classify, Store, StoreResult, UserRow};
use chrono::Utc;

/// The reserved admin user id used as the backfill fallback owner.
pub const ADMIN_USER_ID: i64 = 1;

/// Fields needed to create a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Pre-hashed password.
    pub password_hash: String,
    /// `admin | manager | rep | viewer | customer_admin`.
    pub role: String,
    /// Account/org label, if applicable.
    pub account_name: Option<String>,
}

impl Store {
    /// Create a new user.
    pub async fn create_user(&self, new: NewUser) -> StoreResult<i64> {
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users
                (email, name, password_hash, role, account_name, is_active,
                 is_email_verified, failed_login_attempts, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 1, 0, 0, ?, ?)
             RETURNING id",
        )
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(&new.role)
        .bind(&new.account_name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(id)
    }

    /// Fetch a user by id.
    pub async fn get_user(&self, user_id: i64) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row)
    }

    /// Fetch a user by email (case-sensitive; uniqueness is case-sensitive at
    /// the schema level too).
    pub async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row)
    }

    /// Record a failed login attempt, locking the account out after 5
    /// consecutive failures for 15 minutes. Login/auth flow itself lives
    /// outside this crate's scope; this only maintains the row.
    pub async fn record_failed_login(&self, user_id: i64) -> StoreResult<()> {
        let attempts: i64 =
            sqlx::query_scalar("SELECT failed_login_attempts FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(classify)?;
        let new_attempts = attempts + 1;
        let locked_until = if new_attempts >= 5 {
            Some(Utc::now() + chrono::Duration::minutes(15))
        } else {
            None
        };
        sqlx::query(
            "UPDATE users SET failed_login_attempts = ?, locked_until = ?, updated_at = ? WHERE id = ?",
        )
        .bind(new_attempts)
        .bind(locked_until)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Record a successful login, resetting the failure counter.
    pub async fn record_successful_login(&self, user_id: i64, ip: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users
             SET failed_login_attempts = 0, locked_until = NULL,
                 last_login_at = ?, last_login_ip = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(ip)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_user() {
        let store = Store::open_in_memory().await.unwrap();
        let id = store
            .create_user(NewUser {
                email: "rep@acme.com".into(),
                name: "Rep".into(),
                password_hash: "hash".into(),
                role: "rep".into(),
                account_name: Some("Acme".into()),
            })
            .await
            .unwrap();
        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.email, "rep@acme.com");
        assert!(user.is_active);

        let by_email = store.get_user_by_email("rep@acme.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, id);
    }

    #[tokio::test]
    async fn five_failed_logins_locks_the_account() {
        let store = Store::open_in_memory().await.unwrap();
        let id = store
            .create_user(NewUser {
                email: "u@x.com".into(),
                name: "U".into(),
                password_hash: "h".into(),
                role: "viewer".into(),
                account_name: None,
            })
            .await
            .unwrap();
        for _ in 0..5 {
            store.record_failed_login(id).await.unwrap();
        }
        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 5);
        assert!(user.locked_until.is_some());
    }

    #[tokio::test]
    async fn successful_login_resets_failure_counter() {
        let store = Store::open_in_memory().await.unwrap();
        let id = store
            .create_user(NewUser {
                email: "u2@x.com".into(),
                name: "U".into(),
                password_hash: "h".into(),
                role: "viewer".into(),
                account_name: None,
            })
            .await
            .unwrap();
        store.record_failed_login(id).await.unwrap();
        store.record_successful_login(id, "127.0.0.1").await.unwrap();
        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());
        assert_eq!(user.last_login_ip.as_deref(), Some("127.0.0.1"));
    }
}
