//! `orderq status` – order counts and, with --list, recent orders.

use anyhow::Result;
use orderq_core::order_db::OrderDb;

pub async fn run_status(db: &OrderDb, list: bool, limit: u32) -> Result<()> {
    let counts = db.status_counts().await?;
    println!(
        "queued: {}  created: {}  failed: {}  total: {}",
        counts.queued,
        counts.created,
        counts.failed,
        counts.total()
    );
    if !list {
        return Ok(());
    }

    let orders = db.list_orders(None, limit).await?;
    if orders.is_empty() {
        println!("No orders in database.");
        return Ok(());
    }
    println!(
        "{:<40} {:<8} {:<8} {:<15} {}",
        "REFERENCE", "STATUS", "RETRIES", "NEXT RETRY", "LAST ATTEMPT"
    );
    for o in orders {
        let next = if o.status.is_terminal() {
            "-".to_string()
        } else {
            o.next_retry_at.to_string()
        };
        let last = o
            .last_attempt_at
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:<8} {:<8} {:<15} {}",
            o.order_reference,
            o.status.as_str(),
            o.retries,
            next,
            last
        );
    }
    Ok(())
}
