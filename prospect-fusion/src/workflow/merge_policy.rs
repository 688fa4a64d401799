//! Field merge policy
//!
//! When several records report the same field the kept value is chosen by a
//! total order:
//! 1. highest trust weight
//! 2. most recent retrieval time
//! 3. first value offered
//!
//! Losing values that differ from the winner are counted and logged at debug
//! level. List fields registered through [`FieldMerger::offer_union`] are merged
//! as a sorted, deduplicated set union instead.

use super::profile::{FieldValue, Profile, SourcedValue};
use super::Phase;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct Offer {
    value: FieldValue,
    source: String,
    trust_weight: f64,
    retrieved_at: DateTime<Utc>,
}

impl Offer {
    /// Strictly preferred over `other` (first-seen wins full ties)
    fn beats(&self, other: &Offer) -> bool {
        if self.trust_weight != other.trust_weight {
            return self.trust_weight > other.trust_weight;
        }
        self.retrieved_at > other.retrieved_at
    }
}

#[derive(Debug, Default)]
struct Union {
    items: BTreeSet<String>,
    sources: BTreeSet<String>,
    trust_weight: f64,
    retrieved_at: Option<DateTime<Utc>>,
}

/// Result of writing merged values into a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub fields_added: usize,
    pub ties_discarded: usize,
}

/// Collects per-field offers for one phase
#[derive(Debug)]
pub struct FieldMerger {
    phase: Phase,
    best: BTreeMap<String, Offer>,
    unions: BTreeMap<String, Union>,
    ties_discarded: usize,
}

impl FieldMerger {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            best: BTreeMap::new(),
            unions: BTreeMap::new(),
            ties_discarded: 0,
        }
    }

    /// Offer a single-valued field
    pub fn offer(
        &mut self,
        key: impl Into<String>,
        value: FieldValue,
        source: &str,
        trust_weight: f64,
        retrieved_at: DateTime<Utc>,
    ) {
        let key = key.into();
        let offer = Offer {
            value,
            source: source.to_string(),
            trust_weight,
            retrieved_at,
        };

        let Some(current) = self.best.get_mut(&key) else {
            self.best.insert(key, offer);
            return;
        };

        let (kept, discarded) = if offer.beats(current) {
            let previous = std::mem::replace(current, offer);
            (current.source.clone(), previous)
        } else {
            (current.source.clone(), offer)
        };

        if discarded.value != current.value {
            self.ties_discarded += 1;
            debug!(
                phase = %self.phase,
                field = %key,
                kept_source = %kept,
                discarded_source = %discarded.source,
                discarded_trust = discarded.trust_weight,
                "Discarded conflicting value"
            );
        }
    }

    /// Offer list items to a set-union field
    pub fn offer_union(
        &mut self,
        key: impl Into<String>,
        items: impl IntoIterator<Item = String>,
        source: &str,
        trust_weight: f64,
        retrieved_at: DateTime<Utc>,
    ) {
        let union = self.unions.entry(key.into()).or_default();
        union.items.extend(items);
        union.sources.insert(source.to_string());
        union.trust_weight = union.trust_weight.max(trust_weight);
        union.retrieved_at = Some(match union.retrieved_at {
            Some(prev) if prev > retrieved_at => prev,
            _ => retrieved_at,
        });
    }

    /// True when nothing has been offered
    pub fn is_empty(&self) -> bool {
        self.best.is_empty() && self.unions.values().all(|u| u.items.is_empty())
    }

    /// Write winners into `profile` with insert-if-absent semantics
    pub fn apply_to(self, profile: &mut Profile) -> MergeStats {
        let mut stats = MergeStats {
            fields_added: 0,
            ties_discarded: self.ties_discarded,
        };
        let phase = self.phase;

        for (key, offer) in self.best {
            let value = SourcedValue {
                value: offer.value,
                source: offer.source,
                trust_weight: offer.trust_weight,
                retrieved_at: offer.retrieved_at,
                phase,
            };
            if profile.insert_field(key, value) {
                stats.fields_added += 1;
            }
        }

        for (key, union) in self.unions {
            let Some(retrieved_at) = union.retrieved_at else {
                continue;
            };
            if union.items.is_empty() {
                continue;
            }
            let value = SourcedValue {
                value: FieldValue::List(union.items.into_iter().collect()),
                source: union.sources.into_iter().collect::<Vec<_>>().join("+"),
                trust_weight: union.trust_weight,
                retrieved_at,
                phase,
            };
            if profile.insert_field(key, value) {
                stats.fields_added += 1;
            }
        }

        stats
    }
}
