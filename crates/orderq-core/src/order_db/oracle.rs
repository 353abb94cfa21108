//! Durable idempotency set on the order database.

use async_trait::async_trait;
use sqlx::Row;

use super::db::{now_ms, OrderDb};
use crate::error::Result;
use crate::oracle::IdempotencyOracle;

#[async_trait]
impl IdempotencyOracle for OrderDb {
    async fn exists(&self, reference: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM created_orders WHERE order_reference = ?1
            ) AS present
            "#,
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;
        let present: i64 = row.try_get("present")?;
        Ok(present != 0)
    }

    async fn record_created(&self, reference: &str) -> Result<bool> {
        let r = sqlx::query(
            r#"
            INSERT INTO created_orders (order_reference, recorded_at)
            VALUES (?1, ?2)
            ON CONFLICT(order_reference) DO NOTHING
            "#,
        )
        .bind(reference)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }
}
