//! Phase 1: Bio
//!
//! Merges birth date, height, weight and position from the bio sources.

use super::gather::{gather, PhaseContext};
use super::merge_policy::FieldMerger;
use super::profile::{keys, FieldValue, Profile};
use super::{Phase, PhaseOutcome};
use crate::types::{AthleteSource, SourceKind};
use std::sync::Arc;

pub async fn run(
    ctx: &PhaseContext<'_>,
    sources: &[Arc<dyn AthleteSource>],
    profile: &mut Profile,
) -> PhaseOutcome {
    let gathered = gather(ctx, Phase::Bio, SourceKind::Bio, sources).await;
    let mut merger = FieldMerger::new(Phase::Bio);

    for record in &gathered.records {
        let mut offer = |key: &str, value: FieldValue| {
            merger.offer(key, value, &record.source, record.trust_weight, record.retrieved_at)
        };

        if let Some(birth_date) = &record.attributes.birth_date {
            offer(keys::BIRTH_DATE, FieldValue::Text(birth_date.clone()));
        }
        if let Some(height) = record.attributes.height {
            offer(keys::HEIGHT_IN, FieldValue::Number(f64::from(height)));
        }
        if let Some(weight) = record.attributes.weight {
            offer(keys::WEIGHT_LB, FieldValue::Number(f64::from(weight)));
        }
        if let Some(position) = &record.position {
            offer(keys::POSITION, FieldValue::Text(position.clone()));
        }
    }

    let stats = merger.apply_to(profile);
    let mut outcome = gathered.outcome(Phase::Bio);
    outcome.fields_added = stats.fields_added;
    outcome.ties_discarded = stats.ties_discarded;
    outcome
}
