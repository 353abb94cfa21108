//! `orderq add <REF>...` – queue orders by reference.

use anyhow::Result;
use orderq_core::order_db::{now_ms, OrderDb};

pub async fn run_add(db: &OrderDb, references: &[String]) -> Result<()> {
    let inserted = db.insert_orders(references, now_ms()).await?;
    let skipped = references.len() as u64 - inserted;
    println!("Queued {inserted} order(s)");
    if skipped > 0 {
        println!("Skipped {skipped} reference(s) already known");
    }
    Ok(())
}
