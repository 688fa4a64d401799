//! Source registry
//!
//! Holds the external source collaborators a pipeline consults, grouped by
//! [`SourceKind`] at lookup time.

pub mod recorded;

pub use recorded::{RecordedRecord, RecordedSource, RecordedSourceSpec};

use crate::types::{AthleteSource, SourceKind};
use std::sync::Arc;

/// Registered sources in registration order
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn AthleteSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of recorded sources described in JSON
    pub fn from_specs(specs: Vec<RecordedSourceSpec>) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(RecordedSource::from_spec(spec));
        }
        registry
    }

    pub fn register(&mut self, source: impl AthleteSource + 'static) -> &mut Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Register a source the caller keeps a handle to
    pub fn register_arc(&mut self, source: Arc<dyn AthleteSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn with(mut self, source: impl AthleteSource + 'static) -> Self {
        self.register(source);
        self
    }

    pub fn with_arc(mut self, source: Arc<dyn AthleteSource>) -> Self {
        self.register_arc(source);
        self
    }

    /// Sources of one kind, in registration order
    pub fn of_kind(&self, kind: SourceKind) -> Vec<Arc<dyn AthleteSource>> {
        self.sources
            .iter()
            .filter(|s| s.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn names_of_kind(&self, kind: SourceKind) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.kind() == kind)
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| (s.name(), s.kind())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of_kind_keeps_order() {
        let registry = SourceRegistry::new()
            .with(RecordedSource::new("a", SourceKind::Stats, 0.5))
            .with(RecordedSource::new("b", SourceKind::Bio, 0.5))
            .with(RecordedSource::new("c", SourceKind::Stats, 0.5));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names_of_kind(SourceKind::Stats), vec!["a", "c"]);
        assert!(registry.of_kind(SourceKind::Recruiting).is_empty());
    }
}
