//! Identity layer
//!
//! Normalization, fingerprints, the confidence tier table, the merge forest and
//! the shared [`IdentityResolver`].

pub mod attributes;
pub mod fingerprint;
pub mod merge_graph;
pub mod resolver;
pub mod rules;

pub use attributes::AttributeSet;
pub use fingerprint::Fingerprint;
pub use merge_graph::MergeEdge;
pub use resolver::{
    CanonicalIdentity, DuplicateCandidate, IdentityRepository, IdentityResolver, Resolution,
    ResolutionOutcome, ResolveError,
};
pub use rules::{MatchRule, TierMatch, TIER_RULES};
