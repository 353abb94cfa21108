//! SQLite-backed order database implementation.
//!
//! Handles connection, migrations, and timestamp helpers. Order CRUD lives in `orders`.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Handle to the SQLite-backed order database.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/orderq/orders.db` on Debian.
#[derive(Clone)]
pub struct OrderDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl OrderDb {
    /// Open (or create) the default order database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("orderq")?;
        // Creates the prefixed state directory if it is missing.
        let db_path = xdg_dirs.place_state_file("orders.db")?;
        Self::open_at(&db_path).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let db = OrderDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub(crate) async fn migrate(&self) -> Result<(), sqlx::Error> {
        // - `claimed_until` is the lease taken by `claim_due`.
        // - `created_orders` is the idempotency set; rows are never removed.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                order_reference TEXT PRIMARY KEY NOT NULL,
                status TEXT NOT NULL,
                retries INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_attempt_at INTEGER,
                next_retry_at INTEGER NOT NULL,
                claimed_until INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS orders_due
            ON orders (status, next_retry_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS created_orders (
                order_reference TEXT PRIMARY KEY NOT NULL,
                recorded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dead_letters (
                order_reference TEXT PRIMARY KEY NOT NULL,
                retries INTEGER NOT NULL,
                last_attempt_at INTEGER,
                reason TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix milliseconds (for DB timestamps).
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// `ms + d`, saturating; durations are far below the i64 range in practice.
pub(crate) fn add_ms(ms: i64, d: Duration) -> i64 {
    ms.saturating_add(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<OrderDb> {
    // Single connection to avoid in-memory pool handing back a different empty DB.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = OrderDb { pool };
    db.migrate().await?;
    Ok(db)
}
