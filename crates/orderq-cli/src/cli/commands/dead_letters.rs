//! `orderq dead-letters` – orders that failed permanently.

use anyhow::Result;
use orderq_core::order_db::OrderDb;

pub async fn run_dead_letters(db: &OrderDb) -> Result<()> {
    let letters = db.list_dead_letters().await?;
    if letters.is_empty() {
        println!("No dead letters.");
        return Ok(());
    }
    println!("{:<40} {:<8} {:<15} {}", "REFERENCE", "RETRIES", "RECORDED", "REASON");
    for d in letters {
        println!(
            "{:<40} {:<8} {:<15} {}",
            d.order_reference, d.retries, d.recorded_at, d.reason
        );
    }
    Ok(())
}
