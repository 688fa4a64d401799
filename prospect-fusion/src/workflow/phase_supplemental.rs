//! Phase 2.5: Supplemental stats
//!
//! Adds `advanced.<metric>` fields from advanced-stats sources. A source is
//! only called when the athlete's state or country is in its jurisdiction list
//! (config override first, then the source's own list; empty covers everyone).

use super::gather::{gather, PhaseContext};
use super::merge_policy::FieldMerger;
use super::profile::{keys, FieldValue, Profile};
use super::{Phase, PhaseOutcome};
use crate::identity::attributes::normalize_code;
use crate::types::{AthleteSource, SourceKind};
use std::sync::Arc;
use tracing::debug;

/// Whether `source` covers the queried athlete's jurisdiction
pub fn covers(ctx: &PhaseContext<'_>, source: &dyn AthleteSource) -> bool {
    let list = ctx
        .config
        .jurisdictions_for(source.name())
        .unwrap_or_else(|| source.jurisdictions());
    if list.is_empty() {
        return true;
    }

    [&ctx.query.state, &ctx.query.country]
        .into_iter()
        .flatten()
        .any(|code| list.iter().any(|j| normalize_code(j) == *code))
}

pub async fn run(
    ctx: &PhaseContext<'_>,
    sources: &[Arc<dyn AthleteSource>],
    profile: &mut Profile,
) -> PhaseOutcome {
    let mut covered: Vec<Arc<dyn AthleteSource>> = Vec::new();
    for source in sources {
        if covers(ctx, source.as_ref()) {
            covered.push(Arc::clone(source));
        } else {
            debug!(
                uid = %ctx.uid,
                source = source.name(),
                jurisdiction = ?ctx.query.jurisdiction(),
                "Jurisdiction not covered, skipping source"
            );
        }
    }

    let gathered = gather(ctx, Phase::SupplementalStats, SourceKind::AdvancedStats, &covered).await;
    let mut merger = FieldMerger::new(Phase::SupplementalStats);

    for record in &gathered.records {
        for (metric, value) in &record.metrics {
            merger.offer(
                keys::advanced(metric),
                FieldValue::Number(*value),
                &record.source,
                record.trust_weight,
                record.retrieved_at,
            );
        }
    }

    let stats = merger.apply_to(profile);
    let mut outcome = gathered.outcome(Phase::SupplementalStats);
    outcome.fields_added = stats.fields_added;
    outcome.ties_discarded = stats.ties_discarded;
    outcome
}
