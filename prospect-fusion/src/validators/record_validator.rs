//! Record Validator
//!
//! Parses and shape-checks raw source records before any value reaches a
//! profile. A record failing any check is dropped as a whole.
//!
//! # Checks
//! - name present and non-empty after normalization
//! - grad_year inside the configured range
//! - birth_date parseable in an accepted layout
//! - height / weight inside plausible bounds
//! - numeric metrics finite
//! - known fields carry the expected JSON type

use crate::config::ValidationConfig;
use crate::identity::attributes::{normalize_name, parse_birth_date};
use crate::identity::AttributeSet;
use crate::types::RawRecord;
use chrono::{DateTime, Utc};
use prospect_common::time::season_label;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Freshman season ends three years before graduation
const SEASONS_BEFORE_GRADUATION: i64 = 3;

/// Fields with a fixed meaning; every other field is a candidate metric
const KNOWN_FIELDS: &[&str] = &[
    "name",
    "school",
    "grad_year",
    "birth_date",
    "height",
    "weight",
    "state",
    "country",
    "position",
    "season",
    "offers",
];

/// Shape-check failure. The record is dropped, the phase continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{source_name}: record has no name")]
    MissingName { source_name: String },

    #[error("{source_name}: field {field} should be {expected}")]
    WrongType {
        source_name: String,
        field: String,
        expected: &'static str,
    },

    #[error("{source_name}: grad_year {value} outside {min}..={max}")]
    GradYearOutOfRange {
        source_name: String,
        value: i64,
        min: i32,
        max: i32,
    },

    #[error("{source_name}: unparseable birth_date {value:?}")]
    InvalidBirthDate { source_name: String, value: String },

    #[error("{source_name}: {field} {value} outside {min}..={max}")]
    OutOfBounds {
        source_name: String,
        field: &'static str,
        value: f64,
        min: u16,
        max: u16,
    },

    #[error("{source_name}: metric {field} is not finite")]
    NonFiniteMetric { source_name: String, field: String },

    #[error("{source_name}: invalid season {value:?}")]
    InvalidSeason { source_name: String, value: String },
}

/// Record after parsing and shape checks
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub source: String,
    /// Effective trust weight (config override applied)
    pub trust_weight: f64,
    pub retrieved_at: DateTime<Utc>,
    /// Normalized identity attributes carried by the record
    pub attributes: AttributeSet,
    pub position: Option<String>,
    /// Season label (`2024-25`)
    pub season: Option<String>,
    pub offers: Vec<String>,
    /// Remaining numeric fields
    pub metrics: BTreeMap<String, f64>,
}

/// Shape checker configured with plausibility bounds
#[derive(Debug, Clone, Default)]
pub struct RecordValidator {
    config: ValidationConfig,
}

impl RecordValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Parse `record`, using `trust_weight` as its effective weight
    pub fn parse(
        &self,
        record: &RawRecord,
        trust_weight: f64,
    ) -> Result<ParsedRecord, ValidationError> {
        let src = record.source.as_str();
        let fields = &record.fields;

        let name = opt_string(src, fields, "name")?
            .map(|n| normalize_name(&n))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ValidationError::MissingName {
                source_name: src.to_string(),
            })?;

        let grad_year = match fields.get("grad_year") {
            None | Some(Value::Null) => None,
            Some(value) => Some(self.check_grad_year(src, value)?),
        };

        let birth_date = match opt_string(src, fields, "birth_date")? {
            None => None,
            Some(raw) => {
                let date = parse_birth_date(&raw).ok_or_else(|| ValidationError::InvalidBirthDate {
                    source_name: src.to_string(),
                    value: raw.clone(),
                })?;
                Some(date.format("%Y-%m-%d").to_string())
            }
        };

        let height = match fields.get("height") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let inches = parse_height(value).ok_or_else(|| wrong_type(src, "height", "inches or feet-inches"))?;
                Some(self.check_bounds(
                    src,
                    "height",
                    inches,
                    self.config.min_height_in,
                    self.config.max_height_in,
                )?)
            }
        };

        let weight = match fields.get("weight") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let pounds = number(value).ok_or_else(|| wrong_type(src, "weight", "a number"))?;
                Some(self.check_bounds(
                    src,
                    "weight",
                    pounds,
                    self.config.min_weight_lb,
                    self.config.max_weight_lb,
                )?)
            }
        };

        let season = match fields.get("season") {
            None | Some(Value::Null) => None,
            Some(value) => Some(self.check_season(src, value)?),
        };

        let offers = match fields.get("offers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(normalize_name)
                        .ok_or_else(|| wrong_type(src, "offers", "a list of strings"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::String(s)) => s.split(',').map(normalize_name).collect(),
            Some(_) => return Err(wrong_type(src, "offers", "a list of strings")),
        };
        let offers = offers.into_iter().filter(|o| !o.is_empty()).collect();

        let mut metrics = BTreeMap::new();
        for (field, value) in fields {
            if KNOWN_FIELDS.contains(&field.as_str()) {
                continue;
            }
            let metric = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            if let Some(metric) = metric {
                if !metric.is_finite() {
                    return Err(ValidationError::NonFiniteMetric {
                        source_name: src.to_string(),
                        field: field.clone(),
                    });
                }
                metrics.insert(field.clone(), metric);
            }
        }

        let attributes = AttributeSet {
            name: Some(name),
            school: opt_string(src, fields, "school")?,
            grad_year,
            birth_date,
            height,
            weight,
            state: opt_string(src, fields, "state")?,
            country: opt_string(src, fields, "country")?,
        }
        .normalized();

        Ok(ParsedRecord {
            source: record.source.clone(),
            trust_weight,
            retrieved_at: record.retrieved_at,
            attributes,
            position: opt_string(src, fields, "position")?
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty()),
            season,
            offers,
            metrics,
        })
    }

    fn check_grad_year(&self, src: &str, value: &Value) -> Result<i32, ValidationError> {
        let year = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| wrong_type(src, "grad_year", "an integer year"))?;

        if year < self.config.min_grad_year as i64 || year > self.config.max_grad_year as i64 {
            return Err(ValidationError::GradYearOutOfRange {
                source_name: src.to_string(),
                value: year,
                min: self.config.min_grad_year,
                max: self.config.max_grad_year,
            });
        }
        Ok(year as i32)
    }

    /// Season label from an end year (`2025`) or a `YYYY-YY` label
    ///
    /// The end year must fall between the freshman season of the earliest
    /// accepted class and one season past the latest.
    fn check_season(&self, src: &str, value: &Value) -> Result<String, ValidationError> {
        let invalid = || ValidationError::InvalidSeason {
            source_name: src.to_string(),
            value: value.to_string(),
        };

        let end_year = match value {
            Value::Number(n) => n.as_i64().ok_or_else(invalid)?,
            Value::String(s) => parse_season_end_year(s.trim()).ok_or_else(invalid)?,
            _ => return Err(wrong_type(src, "season", "a year or label")),
        };

        let min = i64::from(self.config.min_grad_year) - SEASONS_BEFORE_GRADUATION;
        let max = i64::from(self.config.max_grad_year) + 1;
        if end_year < min || end_year > max {
            return Err(invalid());
        }
        let end_year = i32::try_from(end_year).map_err(|_| invalid())?;
        Ok(season_label(end_year))
    }

    fn check_bounds(
        &self,
        src: &str,
        field: &'static str,
        value: f64,
        min: u16,
        max: u16,
    ) -> Result<u16, ValidationError> {
        let rounded = value.round();
        if !value.is_finite() || rounded < min as f64 || rounded > max as f64 {
            return Err(ValidationError::OutOfBounds {
                source_name: src.to_string(),
                field,
                value,
                min,
                max,
            });
        }
        Ok(rounded as u16)
    }
}

fn wrong_type(src: &str, field: &str, expected: &'static str) -> ValidationError {
    ValidationError::WrongType {
        source_name: src.to_string(),
        field: field.to_string(),
        expected,
    }
}

fn opt_string(
    src: &str,
    fields: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(wrong_type(src, field, "a string")),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// End year of a `2025` or `2024-25` season string. The short year must
/// follow the start year.
fn parse_season_end_year(raw: &str) -> Option<i64> {
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    match raw.split_once('-') {
        None if raw.len() == 4 && all_digits(raw) => raw.parse().ok(),
        Some((start, end))
            if start.len() == 4 && end.len() == 2 && all_digits(start) && all_digits(end) =>
        {
            let start: i64 = start.parse().ok()?;
            let end_short: i64 = end.parse().ok()?;
            ((start + 1) % 100 == end_short).then_some(start + 1)
        }
        _ => None,
    }
}

/// Inches from a number or a `6-9` / `6'9"` / `6' 9` string
fn parse_height(value: &Value) -> Option<f64> {
    if let Some(inches) = number(value) {
        return Some(inches);
    }
    let raw = value.as_str()?.trim().trim_end_matches('"');
    let (feet, inches) = raw.split_once(['-', '\''])?;
    let feet: f64 = feet.trim().parse().ok()?;
    let inches: f64 = inches.trim().parse().ok()?;
    Some(feet * 12.0 + inches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> RawRecord {
        RawRecord {
            source: "test_source".to_string(),
            trust_weight: 0.7,
            retrieved_at: Utc::now(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    fn validator() -> RecordValidator {
        RecordValidator::new(ValidationConfig::default())
    }

    #[test]
    fn test_parses_full_record() {
        let parsed = validator()
            .parse(
                &record(json!({
                    "name": "Cooper Flagg",
                    "school": "Montverde Academy",
                    "grad_year": 2025,
                    "birth_date": "12/21/2006",
                    "height": "6-9",
                    "weight": 205,
                    "position": "f",
                    "season": 2025,
                    "points_per_game": 16.5,
                    "rebounds": "7.5",
                    "notes": "left-handed"
                })),
                0.9,
            )
            .unwrap();

        assert_eq!(parsed.attributes.name.as_deref(), Some("cooper flagg"));
        assert_eq!(parsed.attributes.birth_date.as_deref(), Some("2006-12-21"));
        assert_eq!(parsed.attributes.height, Some(81));
        assert_eq!(parsed.attributes.weight, Some(205));
        assert_eq!(parsed.position.as_deref(), Some("F"));
        assert_eq!(parsed.season.as_deref(), Some("2024-25"));
        assert_eq!(parsed.metrics.get("points_per_game"), Some(&16.5));
        assert_eq!(parsed.metrics.get("rebounds"), Some(&7.5));
        assert!(!parsed.metrics.contains_key("notes"));
        assert_eq!(parsed.trust_weight, 0.9);
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = validator().parse(&record(json!({"school": "X"})), 0.5).unwrap_err();
        assert!(matches!(err, ValidationError::MissingName { .. }));

        let err = validator().parse(&record(json!({"name": " !! "})), 0.5).unwrap_err();
        assert!(matches!(err, ValidationError::MissingName { .. }));
    }

    #[test]
    fn test_grad_year_range() {
        let err = validator()
            .parse(&record(json!({"name": "A B", "grad_year": 1975})), 0.5)
            .unwrap_err();
        assert!(matches!(err, ValidationError::GradYearOutOfRange { value: 1975, .. }));
    }

    #[test]
    fn test_bad_birth_date_and_bounds() {
        let v = validator();
        assert!(matches!(
            v.parse(&record(json!({"name": "A B", "birth_date": "21.12.2006"})), 0.5),
            Err(ValidationError::InvalidBirthDate { .. })
        ));
        assert!(matches!(
            v.parse(&record(json!({"name": "A B", "height": 120})), 0.5),
            Err(ValidationError::OutOfBounds { field: "height", .. })
        ));
        assert!(matches!(
            v.parse(&record(json!({"name": "A B", "weight": 20})), 0.5),
            Err(ValidationError::OutOfBounds { field: "weight", .. })
        ));
    }

    #[test]
    fn test_wrong_types_and_non_finite() {
        let v = validator();
        assert!(matches!(
            v.parse(&record(json!({"name": 42})), 0.5),
            Err(ValidationError::WrongType { .. })
        ));
        assert!(matches!(
            v.parse(&record(json!({"name": "A B", "offers": 3})), 0.5),
            Err(ValidationError::WrongType { .. })
        ));
        assert!(matches!(
            v.parse(&record(json!({"name": "A B", "usage": "NaN"})), 0.5),
            Err(ValidationError::NonFiniteMetric { .. })
        ));
    }

    #[test]
    fn test_season_year_and_label_accepted() {
        let v = validator();
        for season in [json!(2025), json!("2025"), json!("2024-25"), json!(" 2024-25 ")] {
            let parsed = v
                .parse(&record(json!({"name": "A B", "season": season})), 0.5)
                .unwrap();
            assert_eq!(parsed.season.as_deref(), Some("2024-25"));
        }
        let parsed = v
            .parse(&record(json!({"name": "A B", "season": "1999-00"})), 0.5)
            .unwrap();
        assert_eq!(parsed.season.as_deref(), Some("1999-00"));
    }

    #[test]
    fn test_season_year_out_of_range_rejected() {
        let v = validator();
        // i32::MIN and a value that truncates to 2025 as i32
        for season in [json!(-2147483648i64), json!(4294969321i64), json!(1850), json!(2042)] {
            assert!(
                matches!(
                    v.parse(&record(json!({"name": "A B", "season": season.clone()})), 0.5),
                    Err(ValidationError::InvalidSeason { .. })
                ),
                "season {} accepted",
                season
            );
        }
        assert!(matches!(
            v.parse(&record(json!({"name": "A B", "season": 2024.5})), 0.5),
            Err(ValidationError::InvalidSeason { .. })
        ));
    }

    #[test]
    fn test_malformed_season_label_rejected() {
        let v = validator();
        for season in ["banana", "2024-26", "2024/25", "24-25", "2024-2025", "-2025", ""] {
            assert!(
                matches!(
                    v.parse(&record(json!({"name": "A B", "season": season})), 0.5),
                    Err(ValidationError::InvalidSeason { .. })
                ),
                "season {:?} accepted",
                season
            );
        }
        assert!(matches!(
            v.parse(&record(json!({"name": "A B", "season": [2025]})), 0.5),
            Err(ValidationError::WrongType { .. })
        ));
    }

    #[test]
    fn test_offers_normalized() {
        let parsed = validator()
            .parse(&record(json!({"name": "A B", "offers": ["Duke", " Kentucky "]})), 0.5)
            .unwrap();
        assert_eq!(parsed.offers, vec!["duke".to_string(), "kentucky".to_string()]);
    }
}
