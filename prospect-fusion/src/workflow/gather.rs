//! Source fan-out shared by the source-backed phases
//!
//! Calls every source of a phase concurrently through the retry wrapper, then
//! parses and shape-checks each record. Invalid records are dropped with a
//! warning. Records whose name does not match the query are ignored, since
//! sources return search hits rather than confirmed matches.

use super::profile::{flags, Profile};
use super::retry::{retry_source_call, RetryPolicy};
use super::{Phase, PhaseOutcome, PhaseStatus};
use crate::config::FusionConfig;
use crate::identity::rules::names_match;
use crate::identity::AttributeSet;
use crate::types::{AthleteSource, SearchFilters, SourceError, SourceKind};
use crate::validators::{ParsedRecord, RecordValidator};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-athlete inputs shared by every phase
pub struct PhaseContext<'a> {
    pub uid: &'a str,
    /// Normalized query attributes
    pub query: &'a AttributeSet,
    pub config: &'a FusionConfig,
    pub validator: &'a RecordValidator,
    pub policy: RetryPolicy,
    pub cancel: &'a CancellationToken,
    pub fuzzy_threshold: f64,
}

impl PhaseContext<'_> {
    fn filters(&self, kind: SourceKind) -> SearchFilters {
        SearchFilters {
            uid: Some(self.uid.to_string()),
            kind: Some(kind),
            grad_year: self.query.grad_year,
            jurisdiction: self.query.jurisdiction().map(str::to_string),
        }
    }

    /// Does this record describe the queried athlete (by name)?
    fn matches_query(&self, record: &ParsedRecord) -> bool {
        match (&self.query.name, &record.attributes.name) {
            (Some(query), Some(found)) => names_match(query, found, self.fuzzy_threshold),
            _ => true,
        }
    }
}

/// Records gathered for one phase
#[derive(Debug, Default)]
pub struct Gathered {
    /// Valid, name-matched records in source order
    pub records: Vec<ParsedRecord>,
    pub records_dropped: usize,
    pub records_ignored: usize,
    pub sources_called: usize,
    pub failures: Vec<SourceError>,
    pub cancelled: bool,
}

impl Gathered {
    /// Outcome skeleton from call results; merge stats are filled by the phase
    pub fn outcome(&self, phase: Phase) -> PhaseOutcome {
        let status = if self.cancelled {
            PhaseStatus::Cancelled
        } else if self.sources_called == 0 {
            PhaseStatus::Skipped
        } else if self.failures.len() == self.sources_called {
            PhaseStatus::Failed
        } else {
            PhaseStatus::Completed
        };

        let mut outcome = PhaseOutcome::new(phase, status);
        outcome.records_dropped = self.records_dropped;
        if !self.failures.is_empty() {
            let text = self
                .failures
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            outcome = outcome.with_error(text);
        }
        outcome
    }
}

/// Call `sources` and collect their valid, matching records
pub async fn gather(
    ctx: &PhaseContext<'_>,
    phase: Phase,
    kind: SourceKind,
    sources: &[Arc<dyn AthleteSource>],
) -> Gathered {
    let mut gathered = Gathered {
        sources_called: sources.len(),
        ..Default::default()
    };
    if sources.is_empty() {
        return gathered;
    }

    let filters = ctx.filters(kind);
    let calls = sources.iter().map(|source| {
        let filters = &filters;
        async move {
            let result = retry_source_call(source.name(), &ctx.policy, ctx.cancel, move || {
                source.search(ctx.query, filters)
            })
            .await;
            (source, result)
        }
    });

    for (source, result) in join_all(calls).await {
        let raw_records = match result {
            Ok(records) => records,
            Err(SourceError::Cancelled) => {
                gathered.cancelled = true;
                continue;
            }
            Err(err) => {
                warn!(
                    uid = %ctx.uid,
                    phase = %phase,
                    source = source.name(),
                    error = %err,
                    "Source call failed"
                );
                gathered.failures.push(err);
                continue;
            }
        };

        for raw in raw_records {
            let trust_weight = ctx.config.trust_weight_for(&raw.source, raw.trust_weight);
            let parsed = match ctx.validator.parse(&raw, trust_weight) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(
                        uid = %ctx.uid,
                        phase = %phase,
                        source = %raw.source,
                        error = %err,
                        "Dropped invalid record"
                    );
                    gathered.records_dropped += 1;
                    continue;
                }
            };

            if !ctx.matches_query(&parsed) {
                debug!(
                    uid = %ctx.uid,
                    phase = %phase,
                    source = %parsed.source,
                    name = ?parsed.attributes.name,
                    "Ignored record for a different athlete"
                );
                gathered.records_ignored += 1;
                continue;
            }

            gathered.records.push(parsed);
        }
    }

    debug!(
        uid = %ctx.uid,
        phase = %phase,
        sources = gathered.sources_called,
        records = gathered.records.len(),
        dropped = gathered.records_dropped,
        ignored = gathered.records_ignored,
        failures = gathered.failures.len(),
        "Gathered source records"
    );

    gathered
}

/// Missing flags a phase is responsible for
pub fn owned_flags(phase: Phase, profile: &Profile) -> Vec<String> {
    match phase {
        Phase::Bio => vec![
            flags::MISSING_BIRTH_DATE.to_string(),
            flags::MISSING_PHYSICAL.to_string(),
        ],
        Phase::Stats => vec![flags::MISSING_MULTI_SEASON.to_string()],
        Phase::SupplementalStats => std::iter::once(flags::MISSING_ADVANCED.to_string())
            .chain(
                profile
                    .advanced_sources
                    .iter()
                    .map(|s| flags::missing_source_stats(s)),
            )
            .collect(),
        Phase::Recruiting => vec![flags::MISSING_RECRUITING.to_string()],
        Phase::Scoring | Phase::Coverage | Phase::Persist => Vec::new(),
    }
}
