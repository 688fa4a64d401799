//! Fusion engine configuration
//!
//! Loaded from TOML with path resolution from `prospect_common::config`
//! (CLI argument → `PROSPECT_CONFIG` → user config dir → defaults), then
//! environment overrides, then validation. Every section is optional.
//!
//! ```toml
//! [pipeline]
//! workers = 8
//! source_timeout_ms = 5000
//!
//! [sources.trust_weights]
//! school_site = 0.4
//!
//! [sources.jurisdictions]
//! circuit_advanced = ["tx", "ca"]
//! ```

use crate::validators::coverage_scorer::CoverageField;
use crate::workflow::retry::RetryPolicy;
use prospect_common::config::{load_toml, resolve_config_path, LoggingConfig};
use prospect_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PROSPECT_CONFIG";

/// Environment variable overriding `pipeline.workers`
pub const WORKERS_ENV_VAR: &str = "PROSPECT_WORKERS";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
    pub validation: ValidationConfig,
    pub identity: IdentityConfig,
    pub sources: SourcesConfig,
    pub scoring: ScoringConfig,
    pub coverage: CoverageConfig,
    pub storage: StorageConfig,
}

/// Worker pool and source-call settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Athletes processed concurrently by `build_profiles`
    pub workers: usize,
    /// Per-attempt source call timeout
    pub source_timeout_ms: u64,
    /// Attempts per source call, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            source_timeout_ms: 10_000,
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
        }
    }
}

/// Record shape-check bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_grad_year: i32,
    pub max_grad_year: i32,
    pub min_height_in: u16,
    pub max_height_in: u16,
    pub min_weight_lb: u16,
    pub max_weight_lb: u16,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_grad_year: 2000,
            max_grad_year: 2040,
            min_height_in: 48,
            max_height_in: 96,
            min_weight_lb: 80,
            max_weight_lb: 400,
        }
    }
}

/// Identity resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Minimum confidence to reuse an existing uid
    pub auto_merge_threshold: f64,
    /// Minimum normalized Levenshtein ratio for a fuzzy name match
    pub fuzzy_name_threshold: f64,
    /// Resolver snapshot restored at startup and saved at shutdown
    pub snapshot_path: Option<PathBuf>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            auto_merge_threshold: 0.80,
            fuzzy_name_threshold: 0.85,
            snapshot_path: None,
        }
    }
}

/// Per-source overrides keyed by source name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Trust weight overrides; take precedence over the source and its records
    pub trust_weights: BTreeMap<String, f64>,
    /// Jurisdiction lists for advanced-stats sources (empty list = everyone)
    pub jurisdictions: BTreeMap<String, Vec<String>>,
}

/// One Phase 4 scoring feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// `stars`, `national_rank`, `position_rank`, `height_in`, `weight_lb`,
    /// `latest.<metric>` or `advanced.<metric>`
    pub name: String,
    pub weight: f64,
    pub min: f64,
    pub max: f64,
    /// Lower raw values score higher (ranks)
    #[serde(default)]
    pub invert: bool,
}

impl FeatureSpec {
    pub fn new(name: &str, weight: f64, min: f64, max: f64, invert: bool) -> Self {
        Self {
            name: name.to_string(),
            weight,
            min,
            max,
            invert,
        }
    }
}

/// Phase 4 forecasting features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub features: Vec<FeatureSpec>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            features: vec![
                FeatureSpec::new("stars", 0.30, 0.0, 5.0, false),
                FeatureSpec::new("national_rank", 0.25, 1.0, 300.0, true),
                FeatureSpec::new("position_rank", 0.10, 1.0, 100.0, true),
                FeatureSpec::new("height_in", 0.10, 66.0, 90.0, false),
                FeatureSpec::new("weight_lb", 0.05, 150.0, 300.0, false),
                FeatureSpec::new("latest.points_per_game", 0.10, 0.0, 40.0, false),
                FeatureSpec::new("advanced.offensive_rating", 0.10, 80.0, 140.0, false),
            ],
        }
    }
}

/// Coverage tier definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub weight: f64,
    pub fields: Vec<String>,
}

/// Coverage label threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub label: String,
    pub min_score: f64,
}

/// Coverage tiers and labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub tiers: Vec<TierSpec>,
    /// Highest threshold first
    pub labels: Vec<LabelSpec>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        let tier = |name: &str, weight: f64, fields: &[&str]| TierSpec {
            name: name.to_string(),
            weight,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        };
        let label = |label: &str, min_score: f64| LabelSpec {
            label: label.to_string(),
            min_score,
        };

        Self {
            tiers: vec![
                tier(
                    "critical",
                    0.60,
                    &["recruiting_rank", "advanced_stats", "multi_season_stats"],
                ),
                tier("important", 0.25, &["season_stats", "star_rating", "position"]),
                tier("secondary", 0.15, &["height", "weight", "birth_date", "country"]),
            ],
            labels: vec![
                label("EXCELLENT", 90.0),
                label("GOOD", 70.0),
                label("FAIR", 50.0),
                label("POOR", 0.0),
            ],
        }
    }
}

/// Profile persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; `None` disables persistence
    pub database_path: Option<PathBuf>,
    /// Total time a write keeps retrying on "database is locked"
    pub max_lock_wait_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_lock_wait_ms: 5_000,
        }
    }
}

impl FusionConfig {
    /// Resolve, load, override from environment and validate
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        let mut config: FusionConfig = load_toml(path.as_deref())?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PROSPECT_WORKERS`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(WORKERS_ENV_VAR) {
            let workers = raw.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("{}={:?} is not a worker count: {}", WORKERS_ENV_VAR, raw, e))
            })?;
            info!(workers, "Worker count overridden from environment");
            self.pipeline.workers = workers;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.workers == 0 {
            return Err(Error::Config("pipeline.workers must be positive".into()));
        }
        if p.max_attempts == 0 {
            return Err(Error::Config("pipeline.max_attempts must be at least 1".into()));
        }
        if p.source_timeout_ms == 0 {
            return Err(Error::Config("pipeline.source_timeout_ms must be positive".into()));
        }
        if p.initial_backoff_ms > p.max_backoff_ms {
            return Err(Error::Config(
                "pipeline.initial_backoff_ms exceeds pipeline.max_backoff_ms".into(),
            ));
        }

        let v = &self.validation;
        if v.min_grad_year > v.max_grad_year
            || v.min_height_in > v.max_height_in
            || v.min_weight_lb > v.max_weight_lb
        {
            return Err(Error::Config("validation bounds have min above max".into()));
        }

        for (name, value) in [
            ("identity.auto_merge_threshold", self.identity.auto_merge_threshold),
            ("identity.fuzzy_name_threshold", self.identity.fuzzy_name_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Config(format!("{} must be in (0, 1], got {}", name, value)));
            }
        }

        for (source, weight) in &self.sources.trust_weights {
            check_weight(&format!("sources.trust_weights.{}", source), *weight)?;
        }

        for feature in &self.scoring.features {
            check_weight(&format!("scoring feature {}", feature.name), feature.weight)?;
            if !(feature.min < feature.max) {
                return Err(Error::Config(format!(
                    "scoring feature {} needs min < max",
                    feature.name
                )));
            }
        }

        if self.coverage.tiers.is_empty() {
            return Err(Error::Config("coverage.tiers must not be empty".into()));
        }
        for tier in &self.coverage.tiers {
            check_weight(&format!("coverage tier {}", tier.name), tier.weight)?;
            if tier.fields.is_empty() {
                return Err(Error::Config(format!("coverage tier {} has no fields", tier.name)));
            }
            for field in &tier.fields {
                CoverageField::from_str(field)?;
            }
        }
        if self.coverage.tiers.iter().map(|t| t.weight).sum::<f64>() <= 0.0 {
            return Err(Error::Config("coverage tier weights sum to zero".into()));
        }

        if self.coverage.labels.is_empty() {
            return Err(Error::Config("coverage.labels must not be empty".into()));
        }
        let sorted = self
            .coverage
            .labels
            .windows(2)
            .all(|pair| pair[0].min_score > pair[1].min_score);
        if !sorted {
            return Err(Error::Config(
                "coverage.labels must be sorted by min_score, highest first".into(),
            ));
        }
        if self.coverage.labels.last().is_some_and(|l| l.min_score > 0.0) {
            return Err(Error::Config(
                "coverage.labels must end with a floor label (min_score 0)".into(),
            ));
        }

        Ok(())
    }

    /// Configured trust weight for `source`, else `fallback`
    pub fn trust_weight_for(&self, source: &str, fallback: f64) -> f64 {
        self.sources
            .trust_weights
            .get(source)
            .copied()
            .unwrap_or(fallback)
    }

    /// Configured jurisdiction list for `source`, if any
    pub fn jurisdictions_for(&self, source: &str) -> Option<&[String]> {
        self.sources.jurisdictions.get(source).map(Vec::as_slice)
    }

    /// Source-call retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.pipeline.source_timeout_ms),
            max_attempts: self.pipeline.max_attempts,
            initial_backoff: Duration::from_millis(self.pipeline.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.pipeline.max_backoff_ms),
        }
    }
}

fn check_weight(name: &str, weight: f64) -> Result<()> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{} weight must be >= 0, got {}", name, weight)))
    }
}
