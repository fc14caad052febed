// SPDX-License-Identifier: MIT OR Apache-2.0
//! Embedded, versioned SQL migrations.
//!
//! Each migration is a `(version, name, sql)` tuple applied in order inside
//! its own transaction, with the applied version recorded in
//! `_iv_migrations`. Triggers enforcing non-null `user_id` on
//! `ingestion_runs` and `email_monitors` live in migration
//! `0001_init` as part of the schema itself, not as an application-level
//! check, so they hold regardless of the calling code path.

use sqlx::SqlitePool;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "init",
        sql: include_str!("migrations/0001_init.sql"),
    },
    Migration {
        version: 2,
        name: "backfill_owner_rule",
        sql: include_str!("migrations/0002_backfill_owner_rule.sql"),
    },
];

/// Apply every migration newer than the database's current version, in
/// ascending order, each inside its own transaction.
pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _iv_migrations (
            version     INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            applied_at  TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM _iv_migrations ORDER BY version")
        .fetch_all(pool)
        .await?;
    let max_applied = applied.last().copied().unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > max_applied) {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _iv_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(version = migration.version, name = migration.name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn migrations_apply_cleanly_and_are_idempotent() {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(tables.contains(&"email_monitors".to_string()));
        assert!(tables.contains(&"ingestion_runs".to_string()));
        assert!(tables.contains(&"parse_traces".to_string()));
    }
}
