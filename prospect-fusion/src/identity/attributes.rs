//! Athlete attribute sets and normalization
//!
//! Every attribute is optional. Names and school names are case-folded,
//! punctuation-stripped and whitespace-collapsed; state and country are
//! case-folded and trimmed; birth dates are rewritten to ISO `YYYY-MM-DD` when
//! they parse in one of the accepted layouts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Birth date layouts accepted from sources, in probe order
const BIRTH_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Known-athlete attributes supplied by a caller or parsed from a source record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSet {
    /// Full name
    pub name: Option<String>,
    /// Current school (high school, prep academy)
    pub school: Option<String>,
    /// Graduation class year
    pub grad_year: Option<i32>,
    /// Birth date, ISO `YYYY-MM-DD` after normalization
    pub birth_date: Option<String>,
    /// Height in whole inches
    pub height: Option<u16>,
    /// Weight in whole pounds
    pub weight: Option<u16>,
    /// State or province code
    pub state: Option<String>,
    /// Country code or name
    pub country: Option<String>,
}

impl AttributeSet {
    /// Attribute set with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_school(mut self, school: impl Into<String>) -> Self {
        self.school = Some(school.into());
        self
    }

    pub fn with_grad_year(mut self, grad_year: i32) -> Self {
        self.grad_year = Some(grad_year);
        self
    }

    pub fn with_birth_date(mut self, birth_date: impl Into<String>) -> Self {
        self.birth_date = Some(birth_date.into());
        self
    }

    pub fn with_height(mut self, inches: u16) -> Self {
        self.height = Some(inches);
        self
    }

    pub fn with_weight(mut self, pounds: u16) -> Self {
        self.weight = Some(pounds);
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Normalized copy. Idempotent: normalizing twice gives the same set.
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.as_deref().map(normalize_name).and_then(non_empty),
            school: self.school.as_deref().map(normalize_name).and_then(non_empty),
            grad_year: self.grad_year,
            birth_date: self
                .birth_date
                .as_deref()
                .map(normalize_birth_date)
                .and_then(non_empty),
            height: self.height.filter(|h| *h > 0),
            weight: self.weight.filter(|w| *w > 0),
            state: self.state.as_deref().map(normalize_code).and_then(non_empty),
            country: self.country.as_deref().map(normalize_code).and_then(non_empty),
        }
    }

    /// True when no attribute is set
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.school.is_none()
            && self.grad_year.is_none()
            && self.birth_date.is_none()
            && self.height.is_none()
            && self.weight.is_none()
            && self.state.is_none()
            && self.country.is_none()
    }

    /// Jurisdiction used to decide supplemental-source coverage (state, else country)
    pub fn jurisdiction(&self) -> Option<&str> {
        self.state.as_deref().or(self.country.as_deref())
    }
}

/// Case-fold, strip punctuation, collapse whitespace
///
/// `"  Cooper  Flagg-Jr. "` → `"cooper flaggjr"`
pub fn normalize_name(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-fold and trim a short code (state, country)
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Rewrite a birth date to ISO `YYYY-MM-DD` when it parses; otherwise trimmed input
pub fn normalize_birth_date(raw: &str) -> String {
    let trimmed = raw.trim();
    parse_birth_date(trimmed)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Parse a birth date in any accepted layout
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    BIRTH_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
