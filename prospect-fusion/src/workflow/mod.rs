//! Aggregation workflow
//!
//! # Phases
//! - **Phase 1**: Bio (height, weight, position, birth date)
//! - **Phase 2**: Stats (per-season performance metrics)
//! - **Phase 2.5**: Supplemental stats (advanced metrics, jurisdiction-gated)
//! - **Phase 3**: Recruiting (rankings, stars, offers)
//! - **Phase 4**: Scoring (forecast composite)
//! - **Phase 5**: Coverage (tiered completeness)
//!
//! Each phase returns a [`PhaseOutcome`] and never fails past its own boundary.

pub mod gather;
pub mod merge_policy;
pub mod phase_bio;
pub mod phase_recruiting;
pub mod phase_scoring;
pub mod phase_stats;
pub mod phase_supplemental;
pub mod pipeline;
pub mod profile;
pub mod retry;

pub use pipeline::Pipeline;
pub use profile::{FieldValue, Profile, SourcedValue};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Bio,
    Stats,
    SupplementalStats,
    Recruiting,
    Scoring,
    Coverage,
    /// Post-run persistence (logged like a phase, not part of the fixed sequence)
    Persist,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Bio => "bio",
            Phase::Stats => "stats",
            Phase::SupplementalStats => "supplemental_stats",
            Phase::Recruiting => "recruiting",
            Phase::Scoring => "scoring",
            Phase::Coverage => "coverage",
            Phase::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    /// Source calls failed; missing flags stay set
    Failed,
    /// Nothing to do (no sources, uncovered jurisdiction)
    Skipped,
    Cancelled,
}

/// Uniform phase result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub fields_added: usize,
    /// Flags owned by this phase that are still true after it ran
    pub missing_flags_set: Vec<String>,
    /// Records dropped by shape checks
    pub records_dropped: usize,
    /// Conflicting values discarded by the tie-break
    pub ties_discarded: usize,
    pub error: Option<String>,
}

impl PhaseOutcome {
    pub fn new(phase: Phase, status: PhaseStatus) -> Self {
        Self {
            phase,
            status,
            fields_added: 0,
            missing_flags_set: Vec::new(),
            records_dropped: 0,
            ties_discarded: 0,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Progress events, sent on the optional pipeline channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Identity resolved, phases about to run
    AthleteStarted {
        uid: String,
        identity_confidence: f64,
    },

    PhaseStarted { uid: String, phase: Phase },

    PhaseCompleted { uid: String, outcome: PhaseOutcome },

    AthleteCompleted {
        uid: String,
        coverage_score: Option<f64>,
        cancelled: bool,
    },

    /// Identity resolution failed for a query in a batch
    Error { query: String, message: String },
}
