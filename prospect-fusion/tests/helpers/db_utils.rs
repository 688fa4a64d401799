//! Database Test Utilities

use anyhow::Result;
use prospect_fusion::db::SqliteProfileStore;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

/// Create a SQLite profile store in a temporary directory
///
/// Returns (TempDir, store) - TempDir must be kept alive for duration of test
pub async fn create_test_store() -> Result<(TempDir, SqliteProfileStore)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_prospect.db");
    let store = SqliteProfileStore::open(&db_path).await?;
    Ok((temp_dir, store))
}

/// User table names, sorted
pub async fn table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>("name")).collect())
}
