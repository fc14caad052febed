// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ingestion run and invoice item repository.

use crate::{classify, IngestionRunRow, InvoiceItemRow, Store, StoreResult};
use chrono::Utc;

/// Fields needed to create a new ingestion run.
#[derive(Debug, Clone)]
pub struct NewIngestionRun {
    /// `email-<monitor>-<ts>-<rand>` or `upload-<ts>-<rand>`.
    pub run_id: String,
    /// Owning user id.
    pub user_id: i64,
    /// Free-form account label.
    pub account: Option<String>,
    /// Original filename.
    pub file_name: Option<String>,
    /// File size in bytes.
    pub file_size: Option<i64>,
}

/// A single line item to persist alongside an ingestion run.
#[derive(Debug, Clone)]
pub struct NewInvoiceItem {
    /// Line description.
    pub description: String,
    /// Quantity.
    pub quantity: f64,
    /// Per-unit price, in integer cents.
    pub unit_price_cents: Option<i64>,
    /// Extended line total, in integer cents.
    pub total_cents: Option<i64>,
    /// Category hint.
    pub category: Option<String>,
}

impl Store {
    /// Create a new ingestion run with `status="processing"`.
    pub async fn create_ingestion_run(&self, new: NewIngestionRun) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO ingestion_runs
                (run_id, user_id, account, vendor, file_name, file_size, status, started_at)
             VALUES (?, ?, ?, NULL, ?, ?, 'processing', ?)",
        )
        .bind(&new.run_id)
        .bind(new.user_id)
        .bind(&new.account)
        .bind(&new.file_name)
        .bind(new.file_size)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Finalize an ingestion run and persist its extracted line items, all
    /// inside one transaction.
    pub async fn complete_ingestion_run(
        &self,
        run_id: &str,
        vendor: Option<&str>,
        invoice_total_cents: Option<i64>,
        items: &[NewInvoiceItem],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        sqlx::query(
            "UPDATE ingestion_runs
             SET status = 'completed', vendor = ?, invoice_total_cents = ?, finished_at = ?
             WHERE run_id = ?",
        )
        .bind(vendor)
        .bind(invoice_total_cents)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        for item in items {
            sqlx::query(
                "INSERT INTO invoice_items
                    (run_id, description, quantity, unit_price_cents, total_cents, category)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.total_cents)
            .bind(&item.category)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    /// Mark an ingestion run as failed.
    pub async fn fail_ingestion_run(&self, run_id: &str, _error_message: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE ingestion_runs SET status = 'failed', finished_at = ? WHERE run_id = ?",
        )
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Fetch an ingestion run by id.
    pub async fn get_ingestion_run(&self, run_id: &str) -> StoreResult<Option<IngestionRunRow>> {
        let row = sqlx::query_as::<_, IngestionRunRow>("SELECT * FROM ingestion_runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row)
    }

    /// List the line items for an ingestion run.
    pub async fn list_invoice_items(&self, run_id: &str) -> StoreResult<Vec<InvoiceItemRow>> {
        let rows =
            sqlx::query_as::<_, InvoiceItemRow>("SELECT * FROM invoice_items WHERE run_id = ? ORDER BY id")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await
                .map_err(classify)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(store: &Store) -> i64 {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, name, password_hash, role, created_at, updated_at)
             VALUES ('a@b.com','A','h','admin',?,?) RETURNING id",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(store.pool())
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_complete_and_list_items() {
        let store = Store::open_in_memory().await.unwrap();
        let user_id = seed_user(&store).await;
        let run_id = "upload-1-abc".to_string();

        store
            .create_ingestion_run(NewIngestionRun {
                run_id: run_id.clone(),
                user_id,
                account: None,
                file_name: Some("invoice.pdf".into()),
                file_size: Some(1024),
            })
            .await
            .unwrap();

        store
            .complete_ingestion_run(
                &run_id,
                Some("Sysco Corporation"),
                Some(174_885),
                &[NewInvoiceItem {
                    description: "Widget".into(),
                    quantity: 3.0,
                    unit_price_cents: Some(450),
                    total_cents: Some(1350),
                    category: None,
                }],
            )
            .await
            .unwrap();

        let run = store.get_ingestion_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(run.invoice_total_cents, Some(174_885));

        let items = store.list_invoice_items(&run_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3.0);
    }

    #[tokio::test]
    async fn null_user_id_rejected_on_ingestion_runs() {
        let store = Store::open_in_memory().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO ingestion_runs (run_id, user_id, status, started_at)
             VALUES ('x', NULL, 'processing', ?)",
        )
        .bind(Utc::now())
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fail_ingestion_run_marks_failed() {
        let store = Store::open_in_memory().await.unwrap();
        let user_id = seed_user(&store).await;
        let run_id = "upload-2-def".to_string();
        store
            .create_ingestion_run(NewIngestionRun {
                run_id: run_id.clone(),
                user_id,
                account: None,
                file_name: None,
                file_size: None,
            })
            .await
            .unwrap();
        store.fail_ingestion_run(&run_id, "boom").await.unwrap();
        let run = store.get_ingestion_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
    }
}
