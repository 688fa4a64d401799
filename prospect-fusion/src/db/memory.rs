//! In-memory profile store for tests and dry runs

use crate::types::ProfileStore;
use crate::workflow::Profile;
use prospect_common::Result;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    profiles: HashMap<String, Profile>,
    /// Append order
    snapshots: Vec<(String, String, serde_json::Value)>,
    vectors: HashMap<(String, String), Vec<f64>>,
}

/// [`ProfileStore`] kept in process memory
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    tables: Mutex<Tables>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn profile(&self, uid: &str) -> Option<Profile> {
        self.tables.lock().await.profiles.get(uid).cloned()
    }

    pub async fn profile_count(&self) -> usize {
        self.tables.lock().await.profiles.len()
    }

    /// Snapshots for `uid` as (season, snapshot), in append order
    pub async fn snapshots(&self, uid: &str) -> Vec<(String, serde_json::Value)> {
        self.tables
            .lock()
            .await
            .snapshots
            .iter()
            .filter(|(u, _, _)| u == uid)
            .map(|(_, season, snap)| (season.clone(), snap.clone()))
            .collect()
    }

    pub async fn vector(&self, uid: &str, season: &str) -> Option<Vec<f64>> {
        self.tables
            .lock()
            .await
            .vectors
            .get(&(uid.to_string(), season.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn upsert_profile(&self, uid: &str, profile: &Profile) -> Result<()> {
        self.tables
            .lock()
            .await
            .profiles
            .insert(uid.to_string(), profile.clone());
        Ok(())
    }

    async fn append_historical_snapshot(
        &self,
        uid: &str,
        season: &str,
        snapshot: &serde_json::Value,
    ) -> Result<()> {
        self.tables
            .lock()
            .await
            .snapshots
            .push((uid.to_string(), season.to_string(), snapshot.clone()));
        Ok(())
    }

    async fn store_vector(&self, uid: &str, season: &str, vector: &[f64]) -> Result<()> {
        self.tables
            .lock()
            .await
            .vectors
            .insert((uid.to_string(), season.to_string()), vector.to_vec());
        Ok(())
    }
}
