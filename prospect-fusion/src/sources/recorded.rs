//! Recorded source
//!
//! Replays a fixed list of records for every search. Used by the batch runner
//! (records loaded from JSON) and by tests, which can also make it fail a number
//! of times, fail permanently, or stall past the source timeout.

use crate::identity::AttributeSet;
use crate::types::{AthleteSource, RawRecord, SearchFilters, SourceError, SourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

fn default_trust_weight() -> f64 {
    0.5
}

/// One recorded record; any key other than `trust_weight` / `retrieved_at` is a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// JSON description of a recorded source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSourceSpec {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,
    #[serde(default)]
    pub jurisdictions: Vec<String>,
    /// Every call fails with `Unavailable`
    #[serde(default)]
    pub unavailable: bool,
    /// First N calls fail with `Unavailable`
    #[serde(default)]
    pub fail_times: u32,
    /// Delay before answering
    #[serde(default)]
    pub delay_ms: u64,
    /// Default retrieval time for records without their own
    #[serde(default)]
    pub retrieved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records: Vec<RecordedRecord>,
}

/// Replaying [`AthleteSource`]
#[derive(Debug)]
pub struct RecordedSource {
    name: String,
    kind: SourceKind,
    trust_weight: f64,
    jurisdictions: Vec<String>,
    unavailable: bool,
    failures_left: AtomicU32,
    delay: Duration,
    retrieved_at: DateTime<Utc>,
    records: Vec<RecordedRecord>,
    calls: AtomicUsize,
}

impl RecordedSource {
    /// Empty source; records default to a retrieval time fixed at construction
    pub fn new(name: impl Into<String>, kind: SourceKind, trust_weight: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            trust_weight,
            jurisdictions: Vec::new(),
            unavailable: false,
            failures_left: AtomicU32::new(0),
            delay: Duration::ZERO,
            retrieved_at: Utc::now(),
            records: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_spec(spec: RecordedSourceSpec) -> Self {
        let mut source = Self::new(spec.name, spec.kind, spec.trust_weight)
            .with_jurisdictions(spec.jurisdictions)
            .fail_times(spec.fail_times)
            .with_delay(Duration::from_millis(spec.delay_ms));
        source.unavailable = spec.unavailable;
        if let Some(at) = spec.retrieved_at {
            source.retrieved_at = at;
        }
        source.records = spec.records;
        source
    }

    /// Add a record (a JSON object of fields)
    pub fn with_record(mut self, fields: serde_json::Value) -> Self {
        self.records.push(RecordedRecord {
            trust_weight: None,
            retrieved_at: None,
            fields: fields.as_object().cloned().unwrap_or_default(),
        });
        self
    }

    /// Add a record with its own retrieval time
    pub fn with_record_at(mut self, fields: serde_json::Value, retrieved_at: DateTime<Utc>) -> Self {
        self.records.push(RecordedRecord {
            trust_weight: None,
            retrieved_at: Some(retrieved_at),
            fields: fields.as_object().cloned().unwrap_or_default(),
        });
        self
    }

    pub fn with_jurisdictions(mut self, jurisdictions: Vec<String>) -> Self {
        self.jurisdictions = jurisdictions;
        self
    }

    pub fn with_retrieved_at(mut self, retrieved_at: DateTime<Utc>) -> Self {
        self.retrieved_at = retrieved_at;
        self
    }

    /// Fail every call with `Unavailable`
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Fail the first `n` calls with `Unavailable`
    pub fn fail_times(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Wait before answering (stalls past a short timeout)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `search` calls so far, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn unavailable_error(&self, reason: &str) -> SourceError {
        SourceError::Unavailable {
            source_name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AthleteSource for RecordedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn trust_weight(&self) -> f64 {
        self.trust_weight
    }

    fn jurisdictions(&self) -> &[String] {
        &self.jurisdictions
    }

    async fn search(
        &self,
        _query: &AttributeSet,
        _filters: &SearchFilters,
    ) -> Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.unavailable {
            return Err(self.unavailable_error("configured unavailable"));
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(self.unavailable_error("scripted transient failure"));
        }

        Ok(self
            .records
            .iter()
            .map(|record| RawRecord {
                source: self.name.clone(),
                trust_weight: record.trust_weight.unwrap_or(self.trust_weight),
                retrieved_at: record.retrieved_at.unwrap_or(self.retrieved_at),
                fields: record.fields.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_records() {
        let source = RecordedSource::new("school_site", SourceKind::Bio, 0.4)
            .with_record(json!({"name": "Cooper Flagg", "height": 81}));

        let records = source
            .search(&AttributeSet::default(), &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "school_site");
        assert_eq!(records[0].trust_weight, 0.4);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_times_then_succeed() {
        let source = RecordedSource::new("flaky", SourceKind::Stats, 0.5).fail_times(2);
        let query = AttributeSet::default();
        let filters = SearchFilters::default();

        assert!(source.search(&query, &filters).await.is_err());
        assert!(source.search(&query, &filters).await.is_err());
        assert!(source.search(&query, &filters).await.is_ok());
        assert_eq!(source.call_count(), 3);
    }

    #[test]
    fn test_spec_from_json() {
        let spec: RecordedSourceSpec = serde_json::from_value(json!({
            "name": "rivals",
            "kind": "recruiting",
            "trust_weight": 0.8,
            "records": [
                {"name": "Cooper Flagg", "rank": 1, "retrieved_at": "2025-01-15T00:00:00Z"}
            ]
        }))
        .unwrap();

        assert_eq!(spec.kind, SourceKind::Recruiting);
        assert!(spec.records[0].retrieved_at.is_some());
        assert!(spec.records[0].fields.contains_key("rank"));
        assert!(!spec.records[0].fields.contains_key("retrieved_at"));

        let source = RecordedSource::from_spec(spec);
        assert_eq!(source.name(), "rivals");
    }
}
