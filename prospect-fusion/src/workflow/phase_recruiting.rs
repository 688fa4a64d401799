//! Phase 3: Recruiting
//!
//! Merges rankings, star ratings and offers. Offers are a set union across
//! sources; every other numeric field is a best-value `recruiting.<metric>`.

use super::gather::{gather, PhaseContext};
use super::merge_policy::FieldMerger;
use super::profile::{keys, FieldValue, Profile};
use super::{Phase, PhaseOutcome};
use crate::types::{AthleteSource, SourceKind};
use std::sync::Arc;

/// Field key for a recruiting metric, folding common source aliases
pub fn recruiting_key(metric: &str) -> String {
    match metric {
        "rank" | "national_rank" | "overall_rank" => keys::NATIONAL_RANK.to_string(),
        "position_rank" | "pos_rank" => keys::POSITION_RANK.to_string(),
        "stars" | "star_rating" => keys::STARS.to_string(),
        other => keys::recruiting(other),
    }
}

pub async fn run(
    ctx: &PhaseContext<'_>,
    sources: &[Arc<dyn AthleteSource>],
    profile: &mut Profile,
) -> PhaseOutcome {
    let gathered = gather(ctx, Phase::Recruiting, SourceKind::Recruiting, sources).await;
    let mut merger = FieldMerger::new(Phase::Recruiting);

    for record in &gathered.records {
        for (metric, value) in &record.metrics {
            merger.offer(
                recruiting_key(metric),
                FieldValue::Number(*value),
                &record.source,
                record.trust_weight,
                record.retrieved_at,
            );
        }
        if !record.offers.is_empty() {
            merger.offer_union(
                keys::OFFERS,
                record.offers.iter().cloned(),
                &record.source,
                record.trust_weight,
                record.retrieved_at,
            );
        }
    }

    let stats = merger.apply_to(profile);
    let mut outcome = gathered.outcome(Phase::Recruiting);
    outcome.fields_added = stats.fields_added;
    outcome.ties_discarded = stats.ties_discarded;
    outcome
}
