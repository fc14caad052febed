// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Embedded SQLite storage, schema migrations, and non-null ownership triggers."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! The persistent store for the invoice pipeline. Owns
//! schema evolution via embedded, versioned migrations; every multi-row
//! mutation that must be atomic (finalizing a check run's counters,
//! inserting an ingestion run with its line items) executes inside a single
//! transaction.
//!
//! Triggers — not application code — reject inserts/updates that would set
//! `user_id` to null on `ingestion_runs` or `email_monitors`, so the
//! invariant holds regardless of which repository method (or future code
//! path) performs the write.

mod backfill;
mod check_runs;
mod ingestion;
mod locks;
mod migrations;
mod models;
mod monitors;
mod processing_log;
mod traces;
mod users;

pub use backfill::BackfillAction;
pub use check_runs::{CheckRunFinalization, NewCheckRun};
pub use ingestion::{NewIngestionRun, NewInvoiceItem};
pub use locks::{AcquireOutcome, DEFAULT_LEASE};
pub use models::*;
pub use monitors::NewMonitor;
pub use processing_log::NewProcessingLogEntry;
pub use traces::NewParseTrace;
pub use users::{NewUser, ADMIN_USER_ID};

use sqlx::sqlite::{SqlitePoolOptions, SqliteSynchronous};
use sqlx::ConnectOptions;
use std::str::FromStr;

/// Errors surfaced by the store. Wraps [`sqlx::Error`] and maps a trigger
/// rejection to [`iv_error::ErrorCode::IntegrityViolation`] so it surfaces as
/// an error from the insert site, never silently masked.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A trigger rejected the write (e.g. null `user_id`).
    #[error("integrity constraint violated: {0}")]
    Integrity(String),
    /// Any other database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for iv_error::IvError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Integrity(msg) => {
                iv_error::IvError::new(iv_error::ErrorCode::IntegrityViolation, msg)
            }
            StoreError::Database(e) => {
                iv_error::IvError::new(iv_error::ErrorCode::Internal, "database error").with_source(e)
            }
        }
    }
}

/// Convenience alias for results returned by this crate.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        let msg = db_err.message();
        if msg.contains("must not be null") || msg.contains("RAISE(ABORT") {
            return StoreError::Integrity(msg.to_string());
        }
    }
    StoreError::Database(err)
}

/// A handle to the embedded SQLite database.
///
/// Cheap to clone (wraps a [`sqlx::SqlitePool`]); share one instance across
/// the email check engine, extraction pipeline, and backup supervisor.
#[derive(Clone)]
pub struct Store {
    pool: sqlx::SqlitePool,
}

impl Store {
    /// Open (creating if necessary) the SQLite database at `path` and apply
    /// all pending migrations.
    pub async fn open(path: &str) -> StoreResult<Self> {
        let opts = sqlx::sqlite::SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new().max_connections(8).connect_with(opts).await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database (tests only).
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// Borrow the underlying pool for crates that need raw access (e.g. the
    /// backup supervisor copying the live database file).
    #[must_use]
    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_applies_migrations() {
        let store = Store::open_in_memory().await.unwrap();
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(store.pool())
                .await
                .unwrap();
        assert!(tables.contains(&"email_monitors".to_string()));
    }
}
