//! Profile persistence
//!
//! SQLite storage for built profiles, per-season snapshots and forecast
//! vectors, plus an in-memory store for tests and dry runs. Both implement
//! [`ProfileStore`](crate::types::ProfileStore).

pub mod memory;
pub mod profiles;
pub mod retry;

pub use memory::MemoryProfileStore;
pub use profiles::SqliteProfileStore;
pub use retry::retry_on_lock;

use prospect_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the file (and parent directory) if missing, then the tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create profile tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS athlete_profiles (
            uid TEXT PRIMARY KEY,
            profile TEXT NOT NULL,
            coverage_score REAL,
            cancelled INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only: every build adds one row per season
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_snapshots (
            snapshot_id TEXT PRIMARY KEY,
            uid TEXT NOT NULL,
            season TEXT NOT NULL,
            snapshot TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_profile_snapshots_uid_season ON profile_snapshots (uid, season)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature_vectors (
            uid TEXT NOT NULL,
            season TEXT NOT NULL,
            vector TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (uid, season)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (athlete_profiles, profile_snapshots, feature_vectors)");

    Ok(())
}
