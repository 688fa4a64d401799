//! Phase 4: Scoring
//!
//! Pure function of the profile so far. Each configured feature is min-max
//! normalized into [0,1] (inverted for ranks, where 1 is best) and combined:
//! ```text
//! score           = 100 * Σ(wᵢ·nᵢ) / Σ(wᵢ)      over features present
//! weight_coverage = Σ(wᵢ present) / Σ(wᵢ all)
//! ```
//! With no feature present there is no forecast.

use super::profile::{keys, Profile};
use super::{Phase, PhaseOutcome, PhaseStatus};
use crate::config::{FeatureSpec, ScoringConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One feature as used in a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub name: String,
    pub raw: f64,
    /// Min-max normalized (0.0-1.0), inverted where configured
    pub normalized: f64,
    pub weight: f64,
}

/// Phase 4 result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastScore {
    /// Weighted composite (0.0-100.0)
    pub score: f64,
    /// Share of configured feature weight that was present (0.0-1.0)
    pub weight_coverage: f64,
    /// Present features in config order
    pub features: Vec<FeatureValue>,
}

impl ForecastScore {
    /// Normalized feature vector, as persisted by `store_vector`
    pub fn vector(&self) -> Vec<f64> {
        self.features.iter().map(|f| f.normalized).collect()
    }
}

/// Min-max normalisation into [0,1]; degenerate ranges map to 0.5
pub fn minmax_normalise(value: f64, min_val: f64, max_val: f64) -> f64 {
    if (max_val - min_val).abs() < 1e-10 {
        return 0.5;
    }
    ((value - min_val) / (max_val - min_val)).clamp(0.0, 1.0)
}

/// Weighted composite forecaster
#[derive(Debug, Clone, Default)]
pub struct ForecastScorer {
    features: Vec<FeatureSpec>,
}

impl ForecastScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            features: config.features.clone(),
        }
    }

    /// Raw profile value behind a feature name
    fn raw_value(profile: &Profile, name: &str) -> Option<f64> {
        match name {
            "stars" => profile.number(keys::STARS),
            "national_rank" => profile.number(keys::NATIONAL_RANK),
            "position_rank" => profile.number(keys::POSITION_RANK),
            "height_in" => profile.number(keys::HEIGHT_IN),
            "weight_lb" => profile.number(keys::WEIGHT_LB),
            other => match other.strip_prefix("latest.") {
                Some(metric) => {
                    let season = profile.latest_season()?;
                    profile.number(&keys::stat(&season, metric))
                }
                None => profile.number(other),
            },
        }
    }

    /// Composite score, or `None` when no weighted feature is present
    pub fn score(&self, profile: &Profile) -> Option<ForecastScore> {
        let total_weight: f64 = self.features.iter().map(|f| f.weight).sum();

        let features: Vec<FeatureValue> = self
            .features
            .iter()
            .filter_map(|spec| {
                let raw = Self::raw_value(profile, &spec.name)?;
                let norm = minmax_normalise(raw, spec.min, spec.max);
                Some(FeatureValue {
                    name: spec.name.clone(),
                    raw,
                    normalized: if spec.invert { 1.0 - norm } else { norm },
                    weight: spec.weight,
                })
            })
            .collect();

        let present_weight: f64 = features.iter().map(|f| f.weight).sum();
        if features.is_empty() || present_weight <= 0.0 {
            return None;
        }

        let weighted: f64 = features.iter().map(|f| f.weight * f.normalized).sum();
        let score = 100.0 * weighted / present_weight;
        let weight_coverage = if total_weight > 0.0 {
            present_weight / total_weight
        } else {
            0.0
        };

        Some(ForecastScore {
            score,
            weight_coverage,
            features,
        })
    }
}

/// Attach the forecast to the profile
pub fn run(scorer: &ForecastScorer, profile: &mut Profile) -> PhaseOutcome {
    let forecast = scorer.score(profile);

    let status = match &forecast {
        Some(f) => {
            debug!(
                uid = %profile.uid,
                score = f.score,
                weight_coverage = f.weight_coverage,
                features = f.features.len(),
                "Forecast computed"
            );
            PhaseStatus::Completed
        }
        None => {
            debug!(uid = %profile.uid, "No scoring features present, no forecast");
            PhaseStatus::Skipped
        }
    };

    profile.forecast = forecast;
    PhaseOutcome::new(Phase::Scoring, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AttributeSet;
    use crate::workflow::profile::{FieldValue, SourcedValue};
    use chrono::Utc;

    fn add(profile: &mut Profile, key: &str, value: f64) {
        profile.insert_field(
            key,
            SourcedValue {
                value: FieldValue::Number(value),
                source: "test".into(),
                trust_weight: 1.0,
                retrieved_at: Utc::now(),
                phase: Phase::Recruiting,
            },
        );
    }

    fn profile() -> Profile {
        Profile::new("ath_score", 1.0, AttributeSet::named("Score Test"))
    }

    fn scorer() -> ForecastScorer {
        ForecastScorer::new(&ScoringConfig {
            features: vec![
                FeatureSpec::new("stars", 0.5, 0.0, 5.0, false),
                FeatureSpec::new("national_rank", 0.5, 1.0, 101.0, true),
                FeatureSpec::new("latest.points_per_game", 1.0, 0.0, 40.0, false),
            ],
        })
    }

    #[test]
    fn test_minmax_normalise() {
        assert_eq!(minmax_normalise(5.0, 0.0, 10.0), 0.5);
        assert_eq!(minmax_normalise(-3.0, 0.0, 10.0), 0.0);
        assert_eq!(minmax_normalise(30.0, 0.0, 10.0), 1.0);
        assert_eq!(minmax_normalise(3.0, 3.0, 3.0), 0.5);
    }

    #[test]
    fn test_no_features_no_forecast() {
        let mut p = profile();
        let outcome = run(&scorer(), &mut p);
        assert!(p.forecast.is_none());
        assert_eq!(outcome.status, PhaseStatus::Skipped);
    }

    #[test]
    fn test_composite_over_present_features() {
        let mut p = profile();
        add(&mut p, keys::STARS, 5.0);
        add(&mut p, keys::NATIONAL_RANK, 1.0);

        let forecast = scorer().score(&p).unwrap();
        // Both present features max out; latest.points_per_game absent
        assert!((forecast.score - 100.0).abs() < 1e-9);
        assert!((forecast.weight_coverage - 0.5).abs() < 1e-9);
        assert_eq!(forecast.vector(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_latest_season_feature() {
        let mut p = profile();
        add(&mut p, &keys::stat("2023-24", "points_per_game"), 10.0);
        add(&mut p, &keys::stat("2024-25", "points_per_game"), 20.0);

        let forecast = scorer().score(&p).unwrap();
        assert_eq!(forecast.features.len(), 1);
        assert_eq!(forecast.features[0].raw, 20.0);
        assert!((forecast.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_inverted() {
        let mut p = profile();
        add(&mut p, keys::NATIONAL_RANK, 101.0);
        let forecast = scorer().score(&p).unwrap();
        assert_eq!(forecast.features[0].normalized, 0.0);
    }
}
