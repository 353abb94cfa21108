//! Dead-letter sink: orders that failed permanently, kept for manual inspection.
//!
//! Rows are written by `apply_transition(s)` in the same transaction as the
//! `failed` transition; this module only reads them back.

use sqlx::Row;

use super::db::OrderDb;
use super::types::DeadLetter;
use crate::error::Result;

impl OrderDb {
    /// All dead letters, most recent first.
    pub async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r#"
            SELECT order_reference, retries, last_attempt_at, reason, recorded_at
            FROM dead_letters
            ORDER BY recorded_at DESC, order_reference ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let retries: i64 = row.try_get("retries")?;
            out.push(DeadLetter {
                order_reference: row.try_get("order_reference")?,
                retries: u32::try_from(retries)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                last_attempt_at: row.try_get("last_attempt_at")?,
                reason: row.try_get("reason")?,
                recorded_at: row.try_get("recorded_at")?,
            });
        }
        Ok(out)
    }
}
