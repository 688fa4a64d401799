//! prospect-fusion library interface
//!
//! Athlete-profile fusion: resolves queries to canonical identities, gathers
//! records from external sources phase by phase, merges them under a declared
//! tie-break, then scores and persists the resulting profiles.

pub mod config;
pub mod db;
pub mod identity;
pub mod sources;
pub mod types;
pub mod validators;
pub mod workflow;

pub use config::FusionConfig;
pub use identity::{AttributeSet, IdentityResolver, ResolveError};
pub use sources::{RecordedSource, SourceRegistry};
pub use types::{AthleteSource, ProfileStore, RawRecord, SearchFilters, SourceError, SourceKind};
pub use workflow::{Pipeline, PipelineEvent, Profile};

use serde::{Deserialize, Serialize};
use sources::RecordedSourceSpec;

/// Batch runner input: queries plus the recorded sources to answer them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchInput {
    #[serde(default)]
    pub queries: Vec<AttributeSet>,
    #[serde(default)]
    pub sources: Vec<RecordedSourceSpec>,
}

/// Batch runner output entry, one per query in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchResult {
    Built { profile: Box<Profile> },
    Failed { query: AttributeSet, error: String },
}
