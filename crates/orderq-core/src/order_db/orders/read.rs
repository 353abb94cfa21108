//! Order read operations: due selection, counts, lookups.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::OrderDb;
use super::super::types::{Order, OrderStatus, StatusCounts};
use crate::error::Result;

pub(crate) const ORDER_COLUMNS: &str =
    "order_reference, status, retries, created_at, last_attempt_at, next_retry_at, claimed_until";

/// Due = queued, retry time reached, and not under a live lease.
/// Oldest, least-retried first so a backlog of failing orders cannot starve fresh work.
pub(crate) const DUE_FILTER_AND_ORDER: &str = r#"
    WHERE status = 'queued'
      AND next_retry_at <= ?1
      AND (claimed_until IS NULL OR claimed_until <= ?1)
    ORDER BY retries ASC, created_at ASC, order_reference ASC
    LIMIT ?2
"#;

pub(crate) fn order_from_row(row: &SqliteRow) -> Result<Order, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown order status {status_str:?}").into())
    })?;
    let retries: i64 = row.try_get("retries")?;
    Ok(Order {
        order_reference: row.try_get("order_reference")?,
        status,
        retries: u32::try_from(retries)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        created_at: row.try_get("created_at")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
        next_retry_at: row.try_get("next_retry_at")?,
        claimed_until: row.try_get("claimed_until")?,
    })
}

impl OrderDb {
    /// Queued orders whose `next_retry_at <= now`, in fairness order, at most `limit`.
    ///
    /// Read-only; the engine uses `claim_due` instead.
    pub async fn select_due(&self, now: i64, limit: u32) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders {DUE_FILTER_AND_ORDER}");
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    pub async fn count_by_status(&self, status: OrderStatus) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM orders
            WHERE status = ?1
            "#,
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    /// Totals for every status in one query.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n
            FROM orders
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n.max(0) as u64;
            match OrderStatus::parse(&status) {
                Some(OrderStatus::Queued) => counts.queued = n,
                Some(OrderStatus::Created) => counts.created = n,
                Some(OrderStatus::Failed) => counts.failed = n,
                None => tracing::warn!(status = %status, "ignoring rows with unknown status"),
            }
        }
        Ok(counts)
    }

    /// Fetch a single order by reference.
    pub async fn get_order(&self, reference: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_reference = ?1");
        let row = sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(order_from_row).transpose()?)
    }

    /// List orders newest first, optionally filtered by status.
    pub async fn list_orders(&self, status: Option<OrderStatus>, limit: u32) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY created_at DESC, order_reference DESC
            LIMIT ?2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(OrderStatus::as_str))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }
}
