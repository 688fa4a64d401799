//! Profile: the aggregation unit
//!
//! A Profile is keyed by canonical uid and mutated in place by the phase
//! sequence. Fields are additive: [`Profile::insert_field`] never replaces a
//! value an earlier phase set. Missing flags and feature flags are derived from
//! field state by [`Profile::refresh_derived`], never set independently.

use crate::identity::AttributeSet;
use crate::validators::coverage_scorer::CoverageResult;
use crate::workflow::phase_scoring::ForecastScore;
use crate::workflow::{Phase, PhaseOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Field keys
pub mod keys {
    pub const BIRTH_DATE: &str = "birth_date";
    pub const HEIGHT_IN: &str = "height_in";
    pub const WEIGHT_LB: &str = "weight_lb";
    pub const POSITION: &str = "position";

    pub const STATS_PREFIX: &str = "stats.";
    pub const ADVANCED_PREFIX: &str = "advanced.";
    pub const RECRUITING_PREFIX: &str = "recruiting.";

    pub const NATIONAL_RANK: &str = "recruiting.national_rank";
    pub const POSITION_RANK: &str = "recruiting.position_rank";
    pub const STARS: &str = "recruiting.stars";
    pub const OFFERS: &str = "recruiting.offers";

    /// `stats.<season>.<metric>`
    pub fn stat(season: &str, metric: &str) -> String {
        format!("{}{}.{}", STATS_PREFIX, season, metric)
    }

    /// `advanced.<metric>`
    pub fn advanced(metric: &str) -> String {
        format!("{}{}", ADVANCED_PREFIX, metric)
    }

    /// `recruiting.<metric>`
    pub fn recruiting(metric: &str) -> String {
        format!("{}{}", RECRUITING_PREFIX, metric)
    }
}

/// Missing-reason and feature flag names
pub mod flags {
    pub const MISSING_BIRTH_DATE: &str = "missing_birth_date";
    pub const MISSING_PHYSICAL: &str = "missing_physical_measurements";
    pub const MISSING_MULTI_SEASON: &str = "missing_multi_season_data";
    pub const MISSING_ADVANCED: &str = "missing_advanced_stats";
    pub const MISSING_RECRUITING: &str = "missing_recruiting_coverage";

    pub const HAS_RECRUITING: &str = "has_recruiting_data";
    pub const HAS_ADVANCED: &str = "has_advanced_stats";
    pub const HAS_PROGRESSION: &str = "has_progression_data";
    pub const HAS_PHYSICAL: &str = "has_physical_data";
    pub const HAS_MULTI_SOURCE: &str = "has_multi_source_data";

    /// `missing_<source>_stats`
    pub fn missing_source_stats(source: &str) -> String {
        format!("missing_{}_stats", source)
    }
}

/// Stored field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Field value with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedValue {
    pub value: FieldValue,
    /// Source name (joined with `+` for set unions)
    pub source: String,
    pub trust_weight: f64,
    pub retrieved_at: DateTime<Utc>,
    pub phase: Phase,
}

/// Fused athlete profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub uid: String,
    pub identity_confidence: f64,
    /// Normalized query attributes
    pub attributes: AttributeSet,
    pub fields: BTreeMap<String, SourcedValue>,
    pub missing_reasons: BTreeMap<String, bool>,
    pub feature_flags: BTreeMap<String, bool>,
    pub forecast: Option<ForecastScore>,
    pub coverage: Option<CoverageResult>,
    pub phase_log: Vec<PhaseOutcome>,
    pub cancelled: bool,
    /// Advanced-stats sources tracked by `missing_<source>_stats`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advanced_sources: Vec<String>,
}

impl Profile {
    /// Empty profile with every missing flag set
    pub fn new(uid: impl Into<String>, identity_confidence: f64, attributes: AttributeSet) -> Self {
        let mut profile = Self {
            uid: uid.into(),
            identity_confidence,
            attributes: attributes.normalized(),
            fields: BTreeMap::new(),
            missing_reasons: BTreeMap::new(),
            feature_flags: BTreeMap::new(),
            forecast: None,
            coverage: None,
            phase_log: Vec::new(),
            cancelled: false,
            advanced_sources: Vec::new(),
        };
        profile.refresh_derived();
        profile
    }

    /// Track `missing_<source>_stats` for these advanced-stats sources
    pub fn with_advanced_sources(mut self, sources: Vec<String>) -> Self {
        self.advanced_sources = sources;
        self.refresh_derived();
        self
    }

    /// Insert unless the key is already set. Returns true when inserted.
    pub fn insert_field(&mut self, key: impl Into<String>, value: SourcedValue) -> bool {
        match self.fields.entry(key.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|v| v.value.as_f64())
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.value.as_text())
    }

    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.fields.get(key).and_then(|v| v.value.as_list())
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        self.fields
            .range(prefix.to_string()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(prefix))
    }

    /// Seasons with at least one stat, ascending
    pub fn seasons(&self) -> BTreeSet<String> {
        self.fields
            .keys()
            .filter_map(|k| k.strip_prefix(keys::STATS_PREFIX))
            .filter_map(|rest| rest.split_once('.').map(|(season, _)| season.to_string()))
            .collect()
    }

    pub fn latest_season(&self) -> Option<String> {
        self.seasons().into_iter().next_back()
    }

    /// Numeric stats recorded for `season`, keyed by metric
    pub fn season_metrics(&self, season: &str) -> BTreeMap<String, f64> {
        let prefix = format!("{}{}.", keys::STATS_PREFIX, season);
        self.fields
            .iter()
            .filter_map(|(k, v)| {
                let metric = k.strip_prefix(&prefix)?;
                Some((metric.to_string(), v.value.as_f64()?))
            })
            .collect()
    }

    /// `advanced.*` metrics keyed by metric
    pub fn advanced_metrics(&self) -> BTreeMap<String, f64> {
        self.fields
            .iter()
            .filter_map(|(k, v)| {
                let metric = k.strip_prefix(keys::ADVANCED_PREFIX)?;
                Some((metric.to_string(), v.value.as_f64()?))
            })
            .collect()
    }

    /// Distinct phases that contributed at least one field
    pub fn contributing_phases(&self) -> BTreeSet<Phase> {
        self.fields.values().map(|v| v.phase).collect()
    }

    /// Field values without provenance, for comparing runs
    pub fn field_values(&self) -> BTreeMap<String, FieldValue> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    pub fn is_missing(&self, flag: &str) -> bool {
        self.missing_reasons.get(flag).copied().unwrap_or(false)
    }

    pub fn has_feature(&self, flag: &str) -> bool {
        self.feature_flags.get(flag).copied().unwrap_or(false)
    }

    /// Recompute missing flags and feature flags from field state
    pub fn refresh_derived(&mut self) {
        let has_height = self.has_field(keys::HEIGHT_IN);
        let has_weight = self.has_field(keys::WEIGHT_LB);
        let season_count = self.seasons().len();
        let has_advanced = self.has_prefix(keys::ADVANCED_PREFIX);
        let has_recruiting = self.has_prefix(keys::RECRUITING_PREFIX);
        let has_ranking = [keys::NATIONAL_RANK, keys::POSITION_RANK, keys::STARS]
            .iter()
            .any(|k| self.has_field(k));

        let mut missing = BTreeMap::new();
        missing.insert(
            flags::MISSING_BIRTH_DATE.to_string(),
            !self.has_field(keys::BIRTH_DATE),
        );
        missing.insert(
            flags::MISSING_PHYSICAL.to_string(),
            !(has_height && has_weight),
        );
        missing.insert(flags::MISSING_MULTI_SEASON.to_string(), season_count < 2);
        missing.insert(flags::MISSING_ADVANCED.to_string(), !has_advanced);
        missing.insert(flags::MISSING_RECRUITING.to_string(), !has_recruiting);
        for source in &self.advanced_sources {
            let populated = self.fields.iter().any(|(k, v)| {
                k.starts_with(keys::ADVANCED_PREFIX)
                    && v.source.split('+').any(|s| s == source)
            });
            missing.insert(flags::missing_source_stats(source), !populated);
        }

        let mut features = BTreeMap::new();
        features.insert(flags::HAS_RECRUITING.to_string(), has_ranking);
        features.insert(flags::HAS_ADVANCED.to_string(), has_advanced);
        features.insert(flags::HAS_PROGRESSION.to_string(), season_count > 1);
        features.insert(flags::HAS_PHYSICAL.to_string(), has_height && has_weight);
        features.insert(
            flags::HAS_MULTI_SOURCE.to_string(),
            self.contributing_phases().len() >= 2,
        );

        self.missing_reasons = missing;
        self.feature_flags = features;
    }

    /// Per-season snapshot payloads: season → `{metric: value}` plus identity context
    pub fn season_snapshots(&self) -> Vec<(String, serde_json::Value)> {
        self.seasons()
            .into_iter()
            .map(|season| {
                let metrics = self.season_metrics(&season);
                let snapshot = serde_json::json!({
                    "uid": self.uid,
                    "season": season,
                    "stats": metrics,
                    "coverage_score": self.coverage.as_ref().map(|c| c.overall_score),
                });
                (season, snapshot)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: FieldValue, source: &str, phase: Phase) -> SourcedValue {
        SourcedValue {
            value: v,
            source: source.to_string(),
            trust_weight: 0.5,
            retrieved_at: Utc::now(),
            phase,
        }
    }

    fn empty() -> Profile {
        Profile::new("ath_test", 1.0, AttributeSet::named("Test Athlete"))
    }

    #[test]
    fn test_new_profile_flags_everything_missing() {
        let profile = empty().with_advanced_sources(vec!["circuit".to_string()]);
        for flag in [
            flags::MISSING_BIRTH_DATE,
            flags::MISSING_PHYSICAL,
            flags::MISSING_MULTI_SEASON,
            flags::MISSING_ADVANCED,
            flags::MISSING_RECRUITING,
            "missing_circuit_stats",
        ] {
            assert!(profile.is_missing(flag), "{} should be missing", flag);
        }
        assert!(profile.feature_flags.values().all(|v| !v));
    }

    #[test]
    fn test_insert_field_is_additive() {
        let mut profile = empty();
        assert!(profile.insert_field(keys::HEIGHT_IN, value(FieldValue::Number(80.0), "a", Phase::Bio)));
        assert!(!profile.insert_field(keys::HEIGHT_IN, value(FieldValue::Number(70.0), "b", Phase::Bio)));
        assert_eq!(profile.number(keys::HEIGHT_IN), Some(80.0));
    }

    #[test]
    fn test_seasons_and_metrics() {
        let mut profile = empty();
        profile.insert_field(keys::stat("2023-24", "points_per_game"), value(FieldValue::Number(18.0), "a", Phase::Stats));
        profile.insert_field(keys::stat("2024-25", "points_per_game"), value(FieldValue::Number(22.5), "a", Phase::Stats));
        profile.insert_field(keys::stat("2024-25", "rebounds"), value(FieldValue::Number(8.0), "a", Phase::Stats));

        assert_eq!(profile.seasons().len(), 2);
        assert_eq!(profile.latest_season().as_deref(), Some("2024-25"));
        assert_eq!(profile.season_metrics("2024-25").len(), 2);

        profile.refresh_derived();
        assert!(!profile.is_missing(flags::MISSING_MULTI_SEASON));
        assert!(profile.has_feature(flags::HAS_PROGRESSION));
        assert!(!profile.has_feature(flags::HAS_MULTI_SOURCE));
    }

    #[test]
    fn test_derived_flags_follow_fields() {
        let mut profile = empty().with_advanced_sources(vec!["circuit".to_string()]);
        profile.insert_field(keys::HEIGHT_IN, value(FieldValue::Number(80.0), "bio", Phase::Bio));
        profile.insert_field(keys::WEIGHT_LB, value(FieldValue::Number(200.0), "bio", Phase::Bio));
        profile.insert_field(keys::advanced("offensive_rating"), value(FieldValue::Number(120.0), "circuit", Phase::SupplementalStats));
        profile.insert_field(keys::OFFERS, value(FieldValue::List(vec!["duke".into()]), "rivals", Phase::Recruiting));
        profile.refresh_derived();

        assert!(!profile.is_missing(flags::MISSING_PHYSICAL));
        assert!(!profile.is_missing(flags::MISSING_ADVANCED));
        assert!(!profile.is_missing("missing_circuit_stats"));
        assert!(!profile.is_missing(flags::MISSING_RECRUITING));
        assert!(profile.has_feature(flags::HAS_PHYSICAL));
        assert!(profile.has_feature(flags::HAS_ADVANCED));
        assert!(profile.has_feature(flags::HAS_MULTI_SOURCE));
        // Offers alone are not ranking data
        assert!(!profile.has_feature(flags::HAS_RECRUITING));
    }

    #[test]
    fn test_field_value_untagged_serde() {
        let json = serde_json::to_string(&FieldValue::List(vec!["a".into()])).unwrap();
        assert_eq!(json, r#"["a"]"#);
        let parsed: FieldValue = serde_json::from_str("6.5").unwrap();
        assert_eq!(parsed, FieldValue::Number(6.5));
    }
}
