//! Validators
//!
//! - [`RecordValidator`]: shape checks on raw source records
//! - [`CoverageScorer`]: tiered completeness of a finished profile

pub mod coverage_scorer;
pub mod record_validator;

pub use coverage_scorer::{CoverageField, CoverageResult, CoverageScorer, TierScore};
pub use record_validator::{ParsedRecord, RecordValidator, ValidationError};
