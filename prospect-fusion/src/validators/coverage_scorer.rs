//! Coverage Scorer
//!
//! Turns profile completeness into one comparable number.
//!
//! # Scoring Algorithm
//! Coverage fields are grouped into weighted tiers. For each tier:
//! ```text
//! completeness_t = populated fields / total fields
//! overall        = 100 * Σ(w_t · completeness_t) / Σ(w_t)
//! ```
//! The label is the first configured label (highest threshold first) whose
//! threshold the overall score meets.
//!
//! # Default Tiers
//! - **critical** (0.60): recruiting_rank, advanced_stats, multi_season_stats
//! - **important** (0.25): season_stats, star_rating, position
//! - **secondary** (0.15): height, weight, birth_date, country

use crate::config::{CoverageConfig, LabelSpec};
use crate::workflow::profile::keys;
use crate::workflow::Profile;
use prospect_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Coverage field vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverageField {
    RecruitingRank,
    StarRating,
    Offers,
    AdvancedStats,
    MultiSeasonStats,
    SeasonStats,
    Height,
    Weight,
    BirthDate,
    Position,
    School,
    State,
    Country,
    ForecastScore,
}

impl CoverageField {
    pub const ALL: [CoverageField; 14] = [
        CoverageField::RecruitingRank,
        CoverageField::StarRating,
        CoverageField::Offers,
        CoverageField::AdvancedStats,
        CoverageField::MultiSeasonStats,
        CoverageField::SeasonStats,
        CoverageField::Height,
        CoverageField::Weight,
        CoverageField::BirthDate,
        CoverageField::Position,
        CoverageField::School,
        CoverageField::State,
        CoverageField::Country,
        CoverageField::ForecastScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageField::RecruitingRank => "recruiting_rank",
            CoverageField::StarRating => "star_rating",
            CoverageField::Offers => "offers",
            CoverageField::AdvancedStats => "advanced_stats",
            CoverageField::MultiSeasonStats => "multi_season_stats",
            CoverageField::SeasonStats => "season_stats",
            CoverageField::Height => "height",
            CoverageField::Weight => "weight",
            CoverageField::BirthDate => "birth_date",
            CoverageField::Position => "position",
            CoverageField::School => "school",
            CoverageField::State => "state",
            CoverageField::Country => "country",
            CoverageField::ForecastScore => "forecast_score",
        }
    }

    /// Whether `profile` has this field populated
    pub fn is_populated(&self, profile: &Profile) -> bool {
        match self {
            CoverageField::RecruitingRank => {
                profile.has_field(keys::NATIONAL_RANK) || profile.has_field(keys::POSITION_RANK)
            }
            CoverageField::StarRating => profile.has_field(keys::STARS),
            CoverageField::Offers => profile.list(keys::OFFERS).is_some_and(|o| !o.is_empty()),
            CoverageField::AdvancedStats => !profile.advanced_metrics().is_empty(),
            CoverageField::MultiSeasonStats => profile.seasons().len() >= 2,
            CoverageField::SeasonStats => !profile.seasons().is_empty(),
            CoverageField::Height => profile.has_field(keys::HEIGHT_IN),
            CoverageField::Weight => profile.has_field(keys::WEIGHT_LB),
            CoverageField::BirthDate => profile.has_field(keys::BIRTH_DATE),
            CoverageField::Position => profile.has_field(keys::POSITION),
            CoverageField::School => profile.attributes.school.is_some(),
            CoverageField::State => profile.attributes.state.is_some(),
            CoverageField::Country => profile.attributes.country.is_some(),
            CoverageField::ForecastScore => profile.forecast.is_some(),
        }
    }
}

impl fmt::Display for CoverageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverageField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CoverageField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| Error::Config(format!("Unknown coverage field: {}", s)))
    }
}

/// Per-tier breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierScore {
    /// populated / total (0.0-1.0)
    pub completeness: f64,
    pub weight: f64,
    pub populated: usize,
    pub total: usize,
    /// Unpopulated fields, in tier order
    pub missing: Vec<String>,
}

/// Coverage result attached to a profile by Phase 5
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    /// 0.0-100.0
    pub overall_score: f64,
    pub tiers: BTreeMap<String, TierScore>,
    pub label: String,
}

#[derive(Debug, Clone)]
struct Tier {
    name: String,
    weight: f64,
    fields: Vec<CoverageField>,
}

/// Coverage Scorer
#[derive(Debug, Clone)]
pub struct CoverageScorer {
    tiers: Vec<Tier>,
    labels: Vec<LabelSpec>,
}

impl Default for CoverageScorer {
    fn default() -> Self {
        // Default config only names known fields
        Self::new(&CoverageConfig::default()).unwrap_or(Self {
            tiers: Vec::new(),
            labels: Vec::new(),
        })
    }
}

impl CoverageScorer {
    /// Build from config; unknown field names and a missing floor label are
    /// configuration errors
    pub fn new(config: &CoverageConfig) -> Result<Self> {
        let tiers = config
            .tiers
            .iter()
            .map(|t| -> Result<Tier> {
                Ok(Tier {
                    name: t.name.clone(),
                    weight: t.weight,
                    fields: t
                        .fields
                        .iter()
                        .map(|f| f.parse::<CoverageField>())
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if !config.labels.last().is_some_and(|l| l.min_score <= 0.0) {
            return Err(Error::Config(
                "coverage.labels must end with a floor label (min_score 0)".into(),
            ));
        }

        Ok(Self {
            tiers,
            labels: config.labels.clone(),
        })
    }

    /// Score a profile
    pub fn score(&self, profile: &Profile) -> CoverageResult {
        let mut tiers = BTreeMap::new();
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for tier in &self.tiers {
            let missing: Vec<String> = tier
                .fields
                .iter()
                .filter(|f| !f.is_populated(profile))
                .map(|f| f.to_string())
                .collect();
            let total = tier.fields.len();
            let populated = total - missing.len();
            let completeness = if total == 0 {
                0.0
            } else {
                populated as f64 / total as f64
            };

            weighted += tier.weight * completeness;
            total_weight += tier.weight;

            tiers.insert(
                tier.name.clone(),
                TierScore {
                    completeness,
                    weight: tier.weight,
                    populated,
                    total,
                    missing,
                },
            );
        }

        let overall_score = if total_weight > 0.0 {
            (100.0 * weighted / total_weight).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let label = self.label_for(overall_score);

        debug!(
            uid = %profile.uid,
            overall = overall_score,
            label = %label,
            "Coverage scoring complete"
        );

        CoverageResult {
            overall_score,
            tiers,
            label,
        }
    }

    /// First label whose threshold `score` meets
    ///
    /// The floor label required by [`new`](Self::new) matches every score in
    /// `0..=100`.
    pub fn label_for(&self, score: f64) -> String {
        self.labels
            .iter()
            .find(|l| score >= l.min_score)
            .map(|l| l.label.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AttributeSet;
    use crate::workflow::profile::{FieldValue, SourcedValue};
    use crate::workflow::Phase;
    use chrono::Utc;

    fn add(profile: &mut Profile, key: &str, value: FieldValue) {
        profile.insert_field(
            key,
            SourcedValue {
                value,
                source: "test".into(),
                trust_weight: 1.0,
                retrieved_at: Utc::now(),
                phase: Phase::Bio,
            },
        );
    }

    fn empty() -> Profile {
        Profile::new("ath_cov", 1.0, AttributeSet::named("Coverage Test"))
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!("wingspan".parse::<CoverageField>().is_err());
        assert_eq!(
            "multi_season_stats".parse::<CoverageField>().unwrap(),
            CoverageField::MultiSeasonStats
        );
        for field in CoverageField::ALL {
            assert_eq!(field.as_str().parse::<CoverageField>().unwrap(), field);
        }
    }

    #[test]
    fn test_empty_profile_scores_zero() {
        let result = CoverageScorer::default().score(&empty());
        assert_eq!(result.overall_score, 0.0);
        assert_eq!(result.label, "POOR");
        assert_eq!(result.tiers["critical"].missing.len(), 3);
    }

    #[test]
    fn test_secondary_tier_only() {
        let mut profile = empty();
        profile.attributes.country = Some("usa".into());
        add(&mut profile, keys::HEIGHT_IN, FieldValue::Number(80.0));
        add(&mut profile, keys::WEIGHT_LB, FieldValue::Number(200.0));
        add(&mut profile, keys::BIRTH_DATE, FieldValue::Text("2006-12-21".into()));

        let result = CoverageScorer::default().score(&profile);
        // secondary tier complete: 100 * 0.15 / 1.0
        assert!((result.overall_score - 15.0).abs() < 1e-9);
        assert_eq!(result.tiers["secondary"].completeness, 1.0);
    }

    #[test]
    fn test_adding_fields_never_decreases_score() {
        let scorer = CoverageScorer::default();
        let mut profile = empty();
        let mut last = scorer.score(&profile).overall_score;

        let steps: Vec<(String, FieldValue)> = vec![
            (keys::POSITION.into(), FieldValue::Text("F".into())),
            (keys::stat("2023-24", "points_per_game"), FieldValue::Number(12.0)),
            (keys::stat("2024-25", "points_per_game"), FieldValue::Number(16.0)),
            (keys::STARS.into(), FieldValue::Number(5.0)),
            (keys::NATIONAL_RANK.into(), FieldValue::Number(1.0)),
            (keys::advanced("offensive_rating"), FieldValue::Number(121.0)),
            (keys::HEIGHT_IN.into(), FieldValue::Number(81.0)),
        ];

        for (key, value) in steps {
            add(&mut profile, &key, value);
            let score = scorer.score(&profile).overall_score;
            assert!(score >= last, "adding {} lowered coverage", key);
            last = score;
        }
    }

    #[test]
    fn test_labels() {
        let scorer = CoverageScorer::default();
        assert_eq!(scorer.label_for(95.0), "EXCELLENT");
        assert_eq!(scorer.label_for(90.0), "EXCELLENT");
        assert_eq!(scorer.label_for(70.0), "GOOD");
        assert_eq!(scorer.label_for(55.0), "FAIR");
        assert_eq!(scorer.label_for(10.0), "POOR");
        assert_eq!(scorer.label_for(0.0), "POOR");
    }

    #[test]
    fn test_labels_without_floor_rejected() {
        let mut config = CoverageConfig::default();
        config.labels.retain(|l| l.min_score > 0.0);
        assert!(matches!(CoverageScorer::new(&config), Err(Error::Config(_))));

        config.labels.clear();
        assert!(CoverageScorer::new(&config).is_err());
    }
}
