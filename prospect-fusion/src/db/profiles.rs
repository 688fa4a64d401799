//! SQLite profile store
//!
//! Profiles are stored whole as JSON (one row per uid, replaced on every
//! build). Snapshots are appended, one row per season per build. Feature
//! vectors are keyed by (uid, season) and replaced.

use super::retry::retry_on_lock;
use crate::types::ProfileStore;
use crate::workflow::Profile;
use prospect_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5_000;

/// [`ProfileStore`] backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteProfileStore {
    /// Wrap an initialized pool (see [`init_database_pool`](super::init_database_pool))
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Open (creating if needed) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(super::init_database_pool(path).await?))
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Latest stored profile for `uid`
    pub async fn load_profile(&self, uid: &str) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT profile FROM athlete_profiles WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("profile");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Stored coverage score for `uid`
    pub async fn load_coverage_score(&self, uid: &str) -> Result<Option<f64>> {
        let score: Option<Option<f64>> =
            sqlx::query_scalar("SELECT coverage_score FROM athlete_profiles WHERE uid = ?")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(score.flatten())
    }

    /// All snapshots for `uid`, oldest first
    pub async fn load_snapshots(&self, uid: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let rows = sqlx::query(
            r#"
            SELECT season, snapshot FROM profile_snapshots
            WHERE uid = ?
            ORDER BY recorded_at ASC, rowid ASC
            "#,
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, serde_json::Value)> {
                let season: String = row.get("season");
                let json: String = row.get("snapshot");
                Ok((season, serde_json::from_str(&json)?))
            })
            .collect()
    }

    /// Stored feature vector for (`uid`, `season`)
    pub async fn load_vector(&self, uid: &str, season: &str) -> Result<Option<Vec<f64>>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT vector FROM feature_vectors WHERE uid = ? AND season = ?")
                .bind(uid)
                .bind(season)
                .fetch_optional(&self.pool)
                .await?;

        json.map(|j| serde_json::from_str(&j).map_err(Error::Serialization))
            .transpose()
    }
}

#[async_trait::async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn upsert_profile(&self, uid: &str, profile: &Profile) -> Result<()> {
        // Prepare all data before touching the database
        let profile_json = serde_json::to_string(profile)?;
        let coverage_score = profile.coverage.as_ref().map(|c| c.overall_score);
        let cancelled = profile.cancelled;
        let updated_at = prospect_common::time::now().to_rfc3339();

        let pool = &self.pool;
        let profile_json = profile_json.as_str();
        let updated_at = updated_at.as_str();

        retry_on_lock("upsert_profile", self.max_lock_wait_ms, move || async move {
            sqlx::query(
                r#"
                INSERT INTO athlete_profiles (uid, profile, coverage_score, cancelled, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(uid) DO UPDATE SET
                    profile = excluded.profile,
                    coverage_score = excluded.coverage_score,
                    cancelled = excluded.cancelled,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(uid)
            .bind(profile_json)
            .bind(coverage_score)
            .bind(cancelled)
            .bind(updated_at)
            .execute(pool)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await
    }

    async fn append_historical_snapshot(
        &self,
        uid: &str,
        season: &str,
        snapshot: &serde_json::Value,
    ) -> Result<()> {
        let snapshot_id = Uuid::new_v4().to_string();
        let snapshot_json = serde_json::to_string(snapshot)?;
        let recorded_at = prospect_common::time::now().to_rfc3339();

        let pool = &self.pool;
        let snapshot_id = snapshot_id.as_str();
        let snapshot_json = snapshot_json.as_str();
        let recorded_at = recorded_at.as_str();

        retry_on_lock(
            "append_historical_snapshot",
            self.max_lock_wait_ms,
            move || async move {
                sqlx::query(
                    r#"
                    INSERT INTO profile_snapshots (snapshot_id, uid, season, snapshot, recorded_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(snapshot_id)
                .bind(uid)
                .bind(season)
                .bind(snapshot_json)
                .bind(recorded_at)
                .execute(pool)
                .await
                .map_err(Error::Database)?;

                Ok(())
            },
        )
        .await
    }

    async fn store_vector(&self, uid: &str, season: &str, vector: &[f64]) -> Result<()> {
        let vector_json = serde_json::to_string(vector)?;
        let updated_at = prospect_common::time::now().to_rfc3339();

        let pool = &self.pool;
        let vector_json = vector_json.as_str();
        let updated_at = updated_at.as_str();

        retry_on_lock("store_vector", self.max_lock_wait_ms, move || async move {
            sqlx::query(
                r#"
                INSERT INTO feature_vectors (uid, season, vector, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(uid, season) DO UPDATE SET
                    vector = excluded.vector,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(uid)
            .bind(season)
            .bind(vector_json)
            .bind(updated_at)
            .execute(pool)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AttributeSet;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteProfileStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteProfileStore::open(&dir.path().join("profiles.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_upsert_replaces_profile() {
        let (_dir, store) = store().await;
        let mut profile = Profile::new("ath_1", 0.0, AttributeSet::named("Cooper Flagg"));

        store.upsert_profile("ath_1", &profile).await.unwrap();
        profile.identity_confidence = 1.0;
        store.upsert_profile("ath_1", &profile).await.unwrap();

        let loaded = store.load_profile("ath_1").await.unwrap().unwrap();
        assert_eq!(loaded.identity_confidence, 1.0);
        assert!(store.load_profile("ath_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_row_is_serialization_error() {
        let (_dir, store) = store().await;
        sqlx::query(
            "INSERT INTO athlete_profiles (uid, profile, coverage_score, cancelled, updated_at) \
             VALUES ('ath_bad', '{not json', NULL, 0, '2025-01-15T12:00:00Z')",
        )
        .execute(store.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO feature_vectors (uid, season, vector, updated_at) \
             VALUES ('ath_bad', '2024-25', '[0.1,', '2025-01-15T12:00:00Z')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        assert!(matches!(
            store.load_profile("ath_bad").await,
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            store.load_vector("ath_bad", "2024-25").await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshots_append() {
        let (_dir, store) = store().await;
        let snap = serde_json::json!({"stats": {"points_per_game": 19.2}});

        store.append_historical_snapshot("ath_1", "2024-25", &snap).await.unwrap();
        store.append_historical_snapshot("ath_1", "2024-25", &snap).await.unwrap();

        let snapshots = store.load_snapshots("ath_1").await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].0, "2024-25");
        assert_eq!(snapshots[0].1, snap);
    }

    #[tokio::test]
    async fn test_vector_upsert() {
        let (_dir, store) = store().await;

        store.store_vector("ath_1", "2024-25", &[0.1, 0.2]).await.unwrap();
        store.store_vector("ath_1", "2024-25", &[0.9]).await.unwrap();

        assert_eq!(
            store.load_vector("ath_1", "2024-25").await.unwrap(),
            Some(vec![0.9])
        );
        assert_eq!(store.load_vector("ath_1", "2023-24").await.unwrap(), None);
    }
}
