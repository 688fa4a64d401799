//! Collaborator traits and shared types
//!
//! Defines the two seams of the engine:
//! - [`AthleteSource`]: external data sources queried by the pipeline phases
//! - [`ProfileStore`]: persistence for finished profiles

use crate::identity::AttributeSet;
use crate::workflow::profile::Profile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Source collaborator
// ============================================================================

/// Which phase consumes a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Demographic and physical data (Phase 1)
    Bio,
    /// Per-season performance stats (Phase 2)
    Stats,
    /// Advanced efficiency metrics (Phase 2.5)
    AdvancedStats,
    /// Rankings, stars and offers (Phase 3)
    Recruiting,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Bio => "bio",
            SourceKind::Stats => "stats",
            SourceKind::AdvancedStats => "advanced_stats",
            SourceKind::Recruiting => "recruiting",
        };
        f.write_str(name)
    }
}

/// Narrowing hints passed alongside the query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Canonical uid the search is for
    pub uid: Option<String>,
    pub kind: Option<SourceKind>,
    pub grad_year: Option<i32>,
    pub jurisdiction: Option<String>,
}

/// One search hit as returned by a source
///
/// `fields` holds any subset of name, school, grad_year, birth_date, height,
/// weight, state, country, position, season, offers and numeric stat fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: String,
    pub trust_weight: f64,
    pub retrieved_at: DateTime<Utc>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Source call failures. Recovered by the calling phase.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("Source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Source {source_name} timed out after {timeout_ms} ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("Source {source_name} rejected the request: {reason}")]
    Rejected { source_name: String, reason: String },

    #[error("Source call cancelled")]
    Cancelled,
}

impl SourceError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable { .. } | SourceError::Timeout { .. }
        )
    }
}

/// External data source
///
/// Sources return search hits, not confirmed matches; the pipeline filters
/// records by name before merging them.
#[async_trait::async_trait]
pub trait AthleteSource: Send + Sync {
    /// Source name for provenance and config overrides
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Default trust weight (0.0-1.0) for records without their own
    fn trust_weight(&self) -> f64;

    /// Jurisdictions (state or country, case-folded) this source covers.
    /// Empty covers everyone.
    fn jurisdictions(&self) -> &[String] {
        &[]
    }

    async fn search(
        &self,
        query: &AttributeSet,
        filters: &SearchFilters,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

// ============================================================================
// Persistence collaborator
// ============================================================================

/// Profile persistence
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace the current profile for `uid`
    async fn upsert_profile(&self, uid: &str, profile: &Profile) -> prospect_common::Result<()>;

    /// Append a per-season snapshot (never replaces earlier ones)
    async fn append_historical_snapshot(
        &self,
        uid: &str,
        season: &str,
        snapshot: &serde_json::Value,
    ) -> prospect_common::Result<()>;

    /// Store the normalized forecast feature vector for `uid` and `season`
    async fn store_vector(
        &self,
        uid: &str,
        season: &str,
        vector: &[f64],
    ) -> prospect_common::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let unavailable = SourceError::Unavailable {
            source_name: "a".into(),
            reason: "503".into(),
        };
        let timeout = SourceError::Timeout {
            source_name: "a".into(),
            timeout_ms: 10,
        };
        let rejected = SourceError::Rejected {
            source_name: "a".into(),
            reason: "bad query".into(),
        };

        assert!(unavailable.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!SourceError::Cancelled.is_retryable());
    }

    #[test]
    fn test_source_kind_serde_names() {
        let json = serde_json::to_string(&SourceKind::AdvancedStats).unwrap();
        assert_eq!(json, "\"advanced_stats\"");
        assert_eq!(SourceKind::AdvancedStats.to_string(), "advanced_stats");
    }
}
