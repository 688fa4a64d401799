//! Aggregation Pipeline
//!
//! Builds one Profile per athlete through a fixed phase sequence:
//!
//! - **Phase 1**: Bio (birth date, height, weight, position)
//! - **Phase 2**: Stats (per-season box-score metrics)
//! - **Phase 2.5**: Supplemental stats (advanced metrics, jurisdiction-gated)
//! - **Phase 3**: Recruiting (rankings, stars, offers)
//! - **Phase 4**: Scoring (forecast composite)
//! - **Phase 5**: Coverage
//!
//! then persists through the optional [`ProfileStore`].
//!
//! # Error Handling
//! - Phase failures are recovered into profile state (missing flags, phase log)
//! - Only identity errors (ambiguity, cycles, empty queries) reach the caller
//! - Persistence failures are logged and recorded, never fatal
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(config, resolver, registry)?.with_store(store);
//! let profile = pipeline.build_profile(&AttributeSet::named("Cooper Flagg")).await?;
//! ```

use super::gather::{owned_flags, PhaseContext};
use super::phase_scoring::ForecastScorer;
use super::profile::Profile;
use super::{
    phase_bio, phase_recruiting, phase_scoring, phase_stats, phase_supplemental, Phase,
    PhaseOutcome, PhaseStatus, PipelineEvent,
};
use crate::config::FusionConfig;
use crate::identity::{AttributeSet, IdentityResolver, ResolveError};
use crate::sources::SourceRegistry;
use crate::types::{ProfileStore, SourceKind};
use crate::validators::{CoverageScorer, RecordValidator};
use chrono::Datelike;
use futures::stream::{self, StreamExt};
use prospect_common::time::season_label;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Phases run in this order; persistence follows
const PHASE_SEQUENCE: [Phase; 6] = [
    Phase::Bio,
    Phase::Stats,
    Phase::SupplementalStats,
    Phase::Recruiting,
    Phase::Scoring,
    Phase::Coverage,
];

/// Aggregation Pipeline
pub struct Pipeline {
    config: Arc<FusionConfig>,
    resolver: Arc<IdentityResolver>,
    sources: SourceRegistry,
    validator: RecordValidator,
    forecaster: ForecastScorer,
    coverage: CoverageScorer,
    store: Option<Arc<dyn ProfileStore>>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    /// Create a pipeline without persistence or events
    pub fn new(
        config: FusionConfig,
        resolver: Arc<IdentityResolver>,
        sources: SourceRegistry,
    ) -> prospect_common::Result<Self> {
        let coverage = CoverageScorer::new(&config.coverage)?;
        Ok(Self {
            validator: RecordValidator::new(config.validation.clone()),
            forecaster: ForecastScorer::new(&config.scoring),
            coverage,
            config: Arc::new(config),
            resolver,
            sources,
            store: None,
            event_tx: None,
        })
    }

    /// Persist finished profiles to `store`
    pub fn with_store(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Report progress on `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Build one profile (never cancelled)
    pub async fn build_profile(&self, query: &AttributeSet) -> Result<Profile, ResolveError> {
        self.build_profile_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Build one profile, stopping between phases once `cancel` fires
    ///
    /// A cancelled build returns the partial profile with `cancelled = true`
    /// and is not persisted.
    pub async fn build_profile_with_cancel(
        &self,
        query: &AttributeSet,
        cancel: &CancellationToken,
    ) -> Result<Profile, ResolveError> {
        let resolution = match self.resolver.resolve(query) {
            Ok(resolution) => resolution,
            Err(e) => {
                self.emit_event(PipelineEvent::Error {
                    query: query.name.clone().unwrap_or_default(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let uid = resolution.uid.clone();
        let normalized = query.normalized();
        let advanced_sources = self.sources.names_of_kind(SourceKind::AdvancedStats);
        let mut profile = Profile::new(uid.clone(), resolution.confidence, normalized.clone())
            .with_advanced_sources(advanced_sources);

        info!(
            uid = %uid,
            confidence = resolution.confidence,
            outcome = ?resolution.outcome,
            "Building profile"
        );
        self.emit_event(PipelineEvent::AthleteStarted {
            uid: uid.clone(),
            identity_confidence: resolution.confidence,
        });

        let ctx = PhaseContext {
            uid: &uid,
            query: &normalized,
            config: self.config.as_ref(),
            validator: &self.validator,
            policy: self.config.retry_policy(),
            cancel,
            fuzzy_threshold: self.resolver.fuzzy_threshold(),
        };

        for phase in PHASE_SEQUENCE {
            if cancel.is_cancelled() {
                profile.cancelled = true;
                break;
            }

            self.emit_event(PipelineEvent::PhaseStarted {
                uid: uid.clone(),
                phase,
            });

            let mut outcome = self.run_phase(phase, &ctx, &mut profile).await;

            profile.refresh_derived();
            outcome.missing_flags_set = owned_flags(phase, &profile)
                .into_iter()
                .filter(|flag| profile.is_missing(flag))
                .collect();

            debug!(
                uid = %uid,
                phase = ?phase,
                status = ?outcome.status,
                fields_added = outcome.fields_added,
                records_dropped = outcome.records_dropped,
                "Phase finished"
            );

            let phase_cancelled = outcome.status == PhaseStatus::Cancelled;
            profile.phase_log.push(outcome.clone());
            self.emit_event(PipelineEvent::PhaseCompleted {
                uid: uid.clone(),
                outcome,
            });

            if phase_cancelled {
                profile.cancelled = true;
                break;
            }
        }

        profile.refresh_derived();

        if profile.cancelled {
            info!(
                uid = %uid,
                phases_run = profile.phase_log.len(),
                "Profile build cancelled, returning partial profile"
            );
        } else {
            self.persist(&mut profile).await;
            info!(
                uid = %uid,
                fields = profile.fields.len(),
                coverage = profile.coverage.as_ref().map(|c| c.overall_score),
                "Profile build completed"
            );
        }

        self.emit_event(PipelineEvent::AthleteCompleted {
            uid: uid.clone(),
            coverage_score: profile.coverage.as_ref().map(|c| c.overall_score),
            cancelled: profile.cancelled,
        });

        Ok(profile)
    }

    /// Build many profiles with a bounded worker pool
    ///
    /// Results are returned in input order. Each athlete runs under a child
    /// token of `cancel`.
    pub async fn build_profiles(
        &self,
        queries: Vec<AttributeSet>,
        cancel: &CancellationToken,
    ) -> Vec<Result<Profile, ResolveError>> {
        let workers = self.config.pipeline.workers.max(1);
        let total = queries.len();

        info!(athletes = total, workers, "Starting batch build");

        let mut results: Vec<(usize, Result<Profile, ResolveError>)> =
            stream::iter(queries.into_iter().enumerate())
                .map(|(index, query)| {
                    let token = cancel.child_token();
                    async move {
                        let result = self.build_profile_with_cancel(&query, &token).await;
                        if let Err(e) = &result {
                            warn!(
                                index,
                                name = ?query.name,
                                error = %e,
                                "Identity resolution failed"
                            );
                        }
                        (index, result)
                    }
                })
                .buffer_unordered(workers)
                .collect()
                .await;

        results.sort_by_key(|(index, _)| *index);

        let built = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(athletes = total, built, "Batch build finished");

        results.into_iter().map(|(_, result)| result).collect()
    }

    async fn run_phase(
        &self,
        phase: Phase,
        ctx: &PhaseContext<'_>,
        profile: &mut Profile,
    ) -> PhaseOutcome {
        match phase {
            Phase::Bio => {
                let sources = self.sources.of_kind(SourceKind::Bio);
                phase_bio::run(ctx, &sources, profile).await
            }
            Phase::Stats => {
                let sources = self.sources.of_kind(SourceKind::Stats);
                phase_stats::run(ctx, &sources, profile).await
            }
            Phase::SupplementalStats => {
                let sources = self.sources.of_kind(SourceKind::AdvancedStats);
                phase_supplemental::run(ctx, &sources, profile).await
            }
            Phase::Recruiting => {
                let sources = self.sources.of_kind(SourceKind::Recruiting);
                phase_recruiting::run(ctx, &sources, profile).await
            }
            Phase::Scoring => phase_scoring::run(&self.forecaster, profile),
            Phase::Coverage => {
                profile.coverage = Some(self.coverage.score(profile));
                PhaseOutcome::new(Phase::Coverage, PhaseStatus::Completed)
            }
            // Persistence runs after the sequence, see `persist`
            Phase::Persist => PhaseOutcome::new(Phase::Persist, PhaseStatus::Skipped),
        }
    }

    /// Season a forecast vector is stored under
    fn vector_season(profile: &Profile) -> String {
        profile.latest_season().unwrap_or_else(|| {
            let year = profile
                .attributes
                .grad_year
                .unwrap_or_else(|| prospect_common::time::now().year());
            season_label(year)
        })
    }

    /// Write the profile, its season snapshots and its forecast vector
    async fn persist(&self, profile: &mut Profile) {
        let Some(store) = &self.store else {
            return;
        };

        let uid = profile.uid.clone();
        let mut errors: Vec<String> = Vec::new();

        // Log entry first so the stored profile records its own persistence
        profile
            .phase_log
            .push(PhaseOutcome::new(Phase::Persist, PhaseStatus::Completed));

        if let Err(e) = store.upsert_profile(&uid, profile).await {
            error!(uid = %uid, error = %e, "Failed to persist profile");
            errors.push(format!("upsert_profile: {}", e));
        }

        for (season, snapshot) in profile.season_snapshots() {
            if let Err(e) = store.append_historical_snapshot(&uid, &season, &snapshot).await {
                error!(uid = %uid, season = %season, error = %e, "Failed to append snapshot");
                errors.push(format!("append_historical_snapshot({}): {}", season, e));
            }
        }

        if let Some(forecast) = &profile.forecast {
            let season = Self::vector_season(profile);
            if let Err(e) = store.store_vector(&uid, &season, &forecast.vector()).await {
                error!(uid = %uid, season = %season, error = %e, "Failed to store feature vector");
                errors.push(format!("store_vector({}): {}", season, e));
            }
        }

        if !errors.is_empty() {
            if let Some(entry) = profile.phase_log.last_mut() {
                *entry = PhaseOutcome::new(Phase::Persist, PhaseStatus::Failed)
                    .with_error(errors.join("; "));
            }
        } else {
            debug!(uid = %uid, "Profile persisted");
        }
    }

    /// Non-blocking send; a full or closed channel drops the event
    fn emit_event(&self, event: PipelineEvent) {
        let Some(tx) = &self.event_tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(?event, "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(?event, "Event channel closed, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryProfileStore;
    use crate::sources::RecordedSource;
    use serde_json::json;

    fn pipeline(registry: SourceRegistry) -> Pipeline {
        let config = FusionConfig::default();
        let resolver = Arc::new(IdentityResolver::new(&config.identity));
        Pipeline::new(config, resolver, registry).unwrap()
    }

    #[tokio::test]
    async fn test_empty_registry_still_builds() {
        let profile = pipeline(SourceRegistry::new())
            .build_profile(&AttributeSet::named("Cooper Flagg").with_grad_year(2025))
            .await
            .unwrap();

        assert!(!profile.cancelled);
        assert_eq!(profile.phase_log.len(), PHASE_SEQUENCE.len());
        assert!(profile.phase_log[..4]
            .iter()
            .all(|o| o.status == PhaseStatus::Skipped));
        assert!(profile.coverage.is_some());
    }

    #[tokio::test]
    async fn test_empty_query_is_an_error() {
        let result = pipeline(SourceRegistry::new())
            .build_profile(&AttributeSet::default())
            .await;
        assert!(matches!(result, Err(ResolveError::EmptyAttributes)));
    }

    #[tokio::test]
    async fn test_persists_and_logs_persist_phase() {
        let store = Arc::new(MemoryProfileStore::new());
        let registry = SourceRegistry::new().with(
            RecordedSource::new("box_scores", SourceKind::Stats, 0.7).with_record(json!({
                "name": "Cooper Flagg",
                "season": 2025,
                "points_per_game": 19.2
            })),
        );
        let pipeline = pipeline(registry).with_store(store.clone());

        let profile = pipeline
            .build_profile(&AttributeSet::named("Cooper Flagg"))
            .await
            .unwrap();

        assert_eq!(
            profile.phase_log.last().map(|o| (o.phase, o.status)),
            Some((Phase::Persist, PhaseStatus::Completed))
        );
        assert!(store.profile(&profile.uid).await.is_some());
        assert_eq!(store.snapshots(&profile.uid).await.len(), 1);
        assert!(store.vector(&profile.uid, "2024-25").await.is_some());
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let pipeline = pipeline(SourceRegistry::new()).with_events(tx);

        pipeline
            .build_profile(&AttributeSet::named("Cooper Flagg"))
            .await
            .unwrap();
        drop(pipeline);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(PipelineEvent::AthleteStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::AthleteCompleted { cancelled: false, .. })
        ));
        let completed = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::PhaseCompleted { .. }))
            .count();
        assert_eq!(completed, PHASE_SEQUENCE.len());
    }

    #[tokio::test]
    async fn test_full_event_channel_does_not_stall_build() {
        let (tx, mut rx) = mpsc::channel(1);
        let pipeline = pipeline(SourceRegistry::new()).with_events(tx);

        let profile = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            pipeline.build_profile(&AttributeSet::named("Cooper Flagg")),
        )
        .await
        .expect("build stalled on a full event channel")
        .unwrap();
        drop(pipeline);

        assert!(!profile.cancelled);
        assert!(matches!(rx.recv().await, Some(PipelineEvent::AthleteStarted { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_event_channel_is_ignored() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let pipeline = pipeline(SourceRegistry::new()).with_events(tx);

        let profile = pipeline
            .build_profile(&AttributeSet::named("Cooper Flagg"))
            .await
            .unwrap();
        assert_eq!(profile.phase_log.len(), PHASE_SEQUENCE.len());
    }
}
