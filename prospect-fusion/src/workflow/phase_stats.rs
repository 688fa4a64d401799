//! Phase 2: Stats
//!
//! Merges per-season performance metrics from every stats source into
//! `stats.<season>.<metric>`, best value per metric per season. Records without
//! a season cannot be placed and are dropped.

use super::gather::{gather, PhaseContext};
use super::merge_policy::FieldMerger;
use super::profile::{keys, FieldValue, Profile};
use super::{Phase, PhaseOutcome};
use crate::types::{AthleteSource, SourceKind};
use std::sync::Arc;
use tracing::warn;

pub async fn run(
    ctx: &PhaseContext<'_>,
    sources: &[Arc<dyn AthleteSource>],
    profile: &mut Profile,
) -> PhaseOutcome {
    let gathered = gather(ctx, Phase::Stats, SourceKind::Stats, sources).await;
    let mut merger = FieldMerger::new(Phase::Stats);
    let mut seasonless = 0;

    for record in &gathered.records {
        let Some(season) = &record.season else {
            warn!(
                uid = %ctx.uid,
                source = %record.source,
                "Dropped stats record without a season"
            );
            seasonless += 1;
            continue;
        };

        for (metric, value) in &record.metrics {
            merger.offer(
                keys::stat(season, metric),
                FieldValue::Number(*value),
                &record.source,
                record.trust_weight,
                record.retrieved_at,
            );
        }
    }

    let stats = merger.apply_to(profile);
    let mut outcome = gathered.outcome(Phase::Stats);
    outcome.records_dropped += seasonless;
    outcome.fields_added = stats.fields_added;
    outcome.ties_discarded = stats.ties_discarded;
    outcome
}
