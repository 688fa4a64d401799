//! Recorded-source fixtures
//!
//! One well-covered athlete: bio, two seasons of stats, advanced stats gated
//! to Florida, and recruiting data.

use chrono::{DateTime, TimeZone, Utc};
use prospect_fusion::{
    AttributeSet, FusionConfig, IdentityResolver, Pipeline, RecordedSource, SourceKind,
    SourceRegistry,
};
use serde_json::json;
use std::sync::Arc;

/// Fixed retrieval time so repeated runs see identical records
pub fn retrieved_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn flagg_query() -> AttributeSet {
    AttributeSet::named("Cooper Flagg")
        .with_school("Montverde Academy")
        .with_grad_year(2025)
        .with_birth_date("2006-12-21")
        .with_state("FL")
}

pub fn flagg_bio_source() -> RecordedSource {
    RecordedSource::new("school_site", SourceKind::Bio, 0.6)
        .with_retrieved_at(retrieved_at())
        .with_record(json!({
            "name": "Cooper Flagg",
            "school": "Montverde Academy",
            "birth_date": "12/21/2006",
            "height": "6-9",
            "weight": 205,
            "position": "f"
        }))
}

pub fn flagg_stats_source() -> RecordedSource {
    RecordedSource::new("box_scores", SourceKind::Stats, 0.7)
        .with_retrieved_at(retrieved_at())
        .with_record(json!({
            "name": "Cooper Flagg",
            "season": 2024,
            "points_per_game": 15.1,
            "rebounds_per_game": 7.2
        }))
        .with_record(json!({
            "name": "Cooper Flagg",
            "season": "2024-25",
            "points_per_game": 16.5,
            "rebounds_per_game": 7.5
        }))
}

pub fn flagg_advanced_source() -> RecordedSource {
    RecordedSource::new("circuit_advanced", SourceKind::AdvancedStats, 0.8)
        .with_retrieved_at(retrieved_at())
        .with_jurisdictions(vec!["FL".to_string()])
        .with_record(json!({
            "name": "Cooper Flagg",
            "offensive_rating": 124.3,
            "usage_rate": 27.9
        }))
}

pub fn flagg_recruiting_source() -> RecordedSource {
    RecordedSource::new("recruiting_board", SourceKind::Recruiting, 0.9)
        .with_retrieved_at(retrieved_at())
        .with_record(json!({
            "name": "Cooper Flagg",
            "rank": 1,
            "pos_rank": 1,
            "stars": 5,
            "offers": ["Duke", "Connecticut"]
        }))
}

/// All four fixture sources
pub fn flagg_registry() -> SourceRegistry {
    SourceRegistry::new()
        .with(flagg_bio_source())
        .with(flagg_stats_source())
        .with(flagg_advanced_source())
        .with(flagg_recruiting_source())
}

/// Defaults with short timeouts and backoff
pub fn fast_config() -> FusionConfig {
    let mut config = FusionConfig::default();
    config.pipeline.source_timeout_ms = 100;
    config.pipeline.max_attempts = 3;
    config.pipeline.initial_backoff_ms = 5;
    config.pipeline.max_backoff_ms = 20;
    config
}

/// Pipeline over `registry` with a fresh resolver
pub fn pipeline_with(registry: SourceRegistry, config: FusionConfig) -> Pipeline {
    let resolver = Arc::new(IdentityResolver::new(&config.identity));
    Pipeline::new(config, resolver, registry).expect("valid pipeline config")
}
