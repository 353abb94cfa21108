//! Order write operations: ingest, claim, transition.

use sqlx::{Sqlite, Transaction};
use std::time::Duration;

use super::super::db::{add_ms, OrderDb};
use super::super::types::{Order, OrderRef, OrderStatus, Transition};
use super::read::{order_from_row, DUE_FILTER_AND_ORDER, ORDER_COLUMNS};
use crate::error::Result;

impl OrderDb {
    /// Insert `n` new queued orders with generated references `{prefix}-{now_ms}-{uuid}`.
    ///
    /// References that already exist are left untouched. Returns the inserted references.
    pub async fn upsert_batch(&self, n: u32, reference_prefix: &str, now: i64) -> Result<Vec<OrderRef>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let reference = format!(
                "{}-{}-{}",
                reference_prefix,
                now,
                uuid::Uuid::new_v4().simple()
            );
            if insert_queued(&mut tx, &reference, now).await? {
                inserted.push(reference);
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Insert queued orders with caller-chosen references. Duplicates are ignored.
    /// Returns the number of rows inserted.
    pub async fn insert_orders(&self, references: &[OrderRef], now: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for reference in references {
            if insert_queued(&mut tx, reference, now).await? {
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Atomically select up to `limit` due orders and lease them until `now + lease`.
    ///
    /// While the lease is live no other caller sees these orders as due. The
    /// lease is cleared by `apply_transition(s)`; if the claimer dies, the
    /// orders become due again once it expires.
    ///
    /// Takes the write lock up front so concurrent claimers queue on the busy
    /// timeout instead of deadlocking on a read-to-write upgrade.
    pub async fn claim_due(&self, now: i64, limit: u32, lease: Duration) -> Result<Vec<Order>> {
        let claimed_until = add_ms(now, lease);
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders {DUE_FILTER_AND_ORDER}");
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&mut *tx)
            .await?;
        let mut orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        for order in &mut orders {
            sqlx::query(
                r#"
                UPDATE orders
                SET claimed_until = ?1
                WHERE order_reference = ?2
                "#,
            )
            .bind(claimed_until)
            .bind(&order.order_reference)
            .execute(&mut *tx)
            .await?;
            order.claimed_until = Some(claimed_until);
        }
        tx.commit().await?;
        Ok(orders)
    }

    /// Drop the lease on orders whose attempts could not be recorded, so they are due again.
    pub async fn release_claims(&self, references: &[OrderRef]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for reference in references {
            sqlx::query(
                r#"
                UPDATE orders
                SET claimed_until = NULL
                WHERE order_reference = ?1 AND status = 'queued'
                "#,
            )
            .bind(reference)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Write one order's new state atomically. Returns false if the order was
    /// missing, already terminal, or the transition would lower its retries.
    pub async fn apply_transition(&self, transition: &Transition) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let changed = write_transition(&mut tx, transition).await?;
        tx.commit().await?;
        Ok(changed)
    }

    /// Write every transition of a tick in one transaction; on error nothing is written.
    ///
    /// Returns one flag per transition, in order: true if it was applied, false
    /// if the guards rejected it.
    pub async fn apply_transitions(&self, transitions: &[Transition]) -> Result<Vec<bool>> {
        let mut tx = self.pool.begin().await?;
        let mut applied = Vec::with_capacity(transitions.len());
        for transition in transitions {
            applied.push(write_transition(&mut tx, transition).await?);
        }
        tx.commit().await?;
        Ok(applied)
    }
}

async fn insert_queued(
    tx: &mut Transaction<'_, Sqlite>,
    reference: &str,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let r = sqlx::query(
        r#"
        INSERT INTO orders (
            order_reference, status, retries, created_at,
            last_attempt_at, next_retry_at, claimed_until
        ) VALUES (?1, ?2, 0, ?3, NULL, ?3, NULL)
        ON CONFLICT(order_reference) DO NOTHING
        "#,
    )
    .bind(reference)
    .bind(OrderStatus::Queued.as_str())
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(r.rows_affected() == 1)
}

/// Guarded on `status = 'queued'` so terminal orders never change, and on
/// `retries <= new` so retries never go backwards. A failed order is
/// dead-lettered in the same transaction.
async fn write_transition(
    tx: &mut Transaction<'_, Sqlite>,
    t: &Transition,
) -> Result<bool, sqlx::Error> {
    let r = sqlx::query(
        r#"
        UPDATE orders
        SET status = ?1,
            retries = ?2,
            last_attempt_at = ?3,
            next_retry_at = ?4,
            claimed_until = NULL
        WHERE order_reference = ?5
          AND status = 'queued'
          AND retries <= ?2
        "#,
    )
    .bind(t.status.as_str())
    .bind(i64::from(t.retries))
    .bind(t.last_attempt_at)
    .bind(t.next_retry_at)
    .bind(&t.order_reference)
    .execute(&mut **tx)
    .await?;

    let changed = r.rows_affected() == 1;
    if changed && t.status == OrderStatus::Failed {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (
                order_reference, retries, last_attempt_at, reason, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?3)
            ON CONFLICT(order_reference) DO NOTHING
            "#,
        )
        .bind(&t.order_reference)
        .bind(i64::from(t.retries))
        .bind(t.last_attempt_at)
        .bind(format!("retries exhausted; last outcome {}", t.last_outcome))
        .execute(&mut **tx)
        .await?;
    }
    Ok(changed)
}
