//! Identity Resolver
//!
//! Assigns canonical uids to partial attribute sets and keeps the state an
//! operator needs to review them: the fingerprint table, weak-evidence duplicate
//! candidates and confirmed merge edges.
//!
//! # Resolution
//! 1. Normalize the query and compute its [`Fingerprint`]
//! 2. Evaluate the tier table against every stored identity, grouped by
//!    canonical root (merge edges followed)
//! 3. Known fingerprint: keep its uid, overwrite its stored confidence
//! 4. Unknown fingerprint:
//!    - confidence ≥ auto-merge threshold → alias of the matched uid
//!    - 0 < confidence < threshold → new uid + duplicate candidate per tied root
//!    - confidence 0 → new uid
//!
//! # Concurrency
//! All state sits behind one `RwLock`. `resolve` and `mark_merged` hold the
//! write lock for the whole check-then-insert sequence, so concurrent callers
//! never mint two uids for one fingerprint.

use super::attributes::AttributeSet;
use super::fingerprint::Fingerprint;
use super::merge_graph::{CyclePath, MergeEdge, MergeForest};
use super::rules::{self, TierMatch};
use crate::config::IdentityConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Identity-layer errors. These are the only errors that reach pipeline callers.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Attribute set has no usable fields")]
    EmptyAttributes,

    #[error("Ambiguous match at tier {tier} (confidence {confidence:.2}): {uids:?}")]
    AmbiguousMatch {
        tier: u8,
        confidence: f64,
        uids: Vec<String>,
    },

    #[error("Merge cycle detected from {uid}: {}", .path.join(" -> "))]
    CycleDetected { uid: String, path: Vec<String> },

    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("Identity {uid} is already merged into {target}")]
    AlreadyMerged { uid: String, target: String },

    #[error("Identity snapshot error: {0}")]
    Snapshot(String),
}

impl From<CyclePath> for ResolveError {
    fn from(cycle: CyclePath) -> Self {
        ResolveError::CycleDetected {
            uid: cycle.uid,
            path: cycle.path,
        }
    }
}

/// Fingerprint table entry. Aliased fingerprints share their target's uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    pub uid: String,
    /// Confidence of the latest resolution of this fingerprint
    pub confidence: f64,
    pub fingerprint: Fingerprint,
    /// Normalized attributes the fingerprint was built from
    pub attributes: AttributeSet,
}

/// Weak-evidence link recorded for manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    /// Newly minted uid
    pub uid_a: String,
    /// Existing uid it resembles
    pub uid_b: String,
    pub similarity: f64,
}

/// Persistable resolver state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityRepository {
    /// Fingerprint table in first-seen order
    pub identities: Vec<CanonicalIdentity>,
    /// Append-only
    pub candidates: Vec<DuplicateCandidate>,
    pub merges: Vec<MergeEdge>,
}

/// How a resolution was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Fingerprint was already known
    Existing,
    /// New fingerprint recorded as an alias of a strong match
    Aliased,
    /// New uid linked to weak matches for review
    Candidate,
    /// New uid with no match at all
    New,
}

/// Result of [`IdentityResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub uid: String,
    pub confidence: f64,
    /// Tier that decided the confidence, `None` for 0.00
    pub tier: Option<u8>,
    /// Canonical root of the best match, when there was one
    pub matched_uid: Option<String>,
    pub outcome: ResolutionOutcome,
}

#[derive(Debug, Default)]
struct ResolverState {
    repo: IdentityRepository,
    /// fingerprint → index into `repo.identities`
    by_fingerprint: HashMap<Fingerprint, usize>,
    /// Uids minted so far (aliases do not mint)
    minted: HashSet<String>,
    forest: MergeForest,
}

impl ResolverState {
    fn from_repository(repo: IdentityRepository) -> Result<Self, ResolveError> {
        let forest = MergeForest::from_edges(&repo.merges);
        forest.validate()?;

        let by_fingerprint = repo
            .identities
            .iter()
            .enumerate()
            .map(|(i, id)| (id.fingerprint.clone(), i))
            .collect();
        let minted = repo.identities.iter().map(|id| id.uid.clone()).collect();

        Ok(Self {
            repo,
            by_fingerprint,
            minted,
            forest,
        })
    }

    /// Best tier over all stored identities, with the distinct canonical roots
    /// that reach it in first-seen order
    fn best_match(
        &self,
        query: &AttributeSet,
        fuzzy_threshold: f64,
    ) -> Result<Option<(TierMatch, Vec<String>)>, ResolveError> {
        let mut best: Option<(TierMatch, Vec<String>)> = None;

        for identity in &self.repo.identities {
            let Some(m) = rules::evaluate(query, &identity.attributes, fuzzy_threshold) else {
                continue;
            };
            let root = self.forest.root(&identity.uid)?;

            let better = match &best {
                None => true,
                Some((current, _)) => m.tier < current.tier,
            };
            if better {
                best = Some((m, vec![root]));
            } else if let Some((current, roots)) = &mut best {
                if m.tier == current.tier && !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }

        Ok(best)
    }
}

/// Thread-safe identity resolver, shared between pipeline workers via `Arc`
#[derive(Debug)]
pub struct IdentityResolver {
    state: RwLock<ResolverState>,
    auto_merge_threshold: f64,
    fuzzy_threshold: f64,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(&IdentityConfig::default())
    }
}

impl IdentityResolver {
    /// Empty resolver with thresholds from config
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            state: RwLock::new(ResolverState::default()),
            auto_merge_threshold: config.auto_merge_threshold,
            fuzzy_threshold: config.fuzzy_name_threshold,
        }
    }

    /// Resolver restored from a repository snapshot
    ///
    /// Fails with `CycleDetected` when the persisted merge edges loop.
    pub fn from_snapshot(
        repo: IdentityRepository,
        config: &IdentityConfig,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            state: RwLock::new(ResolverState::from_repository(repo)?),
            auto_merge_threshold: config.auto_merge_threshold,
            fuzzy_threshold: config.fuzzy_name_threshold,
        })
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    fn read(&self) -> RwLockReadGuard<'_, ResolverState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ResolverState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve an attribute set to a canonical uid and match confidence
    pub fn resolve(&self, attrs: &AttributeSet) -> Result<Resolution, ResolveError> {
        let query = attrs.normalized();
        let fingerprint = Fingerprint::from_attributes(&query);
        if fingerprint.is_empty() {
            return Err(ResolveError::EmptyAttributes);
        }

        let mut state = self.write();
        let best = state.best_match(&query, self.fuzzy_threshold)?;
        let (tier, confidence, roots) = match best {
            Some((m, roots)) => (Some(m.tier), m.confidence, roots),
            None => (None, 0.0, Vec::new()),
        };

        // Known fingerprint: uid is fixed, only the confidence moves. A merged
        // uid resolves to the root it was merged into.
        if let Some(&index) = state.by_fingerprint.get(&fingerprint) {
            let identity = &mut state.repo.identities[index];
            identity.confidence = confidence;
            let stored_uid = identity.uid.clone();
            let uid = state.forest.root(&stored_uid)?;

            debug!(uid = %uid, stored_uid = %stored_uid, confidence, ?tier, "Resolved known fingerprint");
            return Ok(Resolution {
                uid,
                confidence,
                tier,
                matched_uid: roots.into_iter().next(),
                outcome: ResolutionOutcome::Existing,
            });
        }

        if confidence >= self.auto_merge_threshold {
            if roots.len() > 1 {
                warn!(
                    tier = ?tier,
                    confidence,
                    uids = ?roots,
                    "Ambiguous identity match"
                );
                return Err(ResolveError::AmbiguousMatch {
                    tier: tier.unwrap_or_default(),
                    confidence,
                    uids: roots,
                });
            }

            let Some(target) = roots.into_iter().next() else {
                return Err(ResolveError::EmptyAttributes);
            };
            let index = state.repo.identities.len();
            state.repo.identities.push(CanonicalIdentity {
                uid: target.clone(),
                confidence,
                fingerprint: fingerprint.clone(),
                attributes: query,
            });
            state.by_fingerprint.insert(fingerprint, index);

            debug!(uid = %target, confidence, ?tier, "Aliased fingerprint to existing identity");
            return Ok(Resolution {
                uid: target.clone(),
                confidence,
                tier,
                matched_uid: Some(target),
                outcome: ResolutionOutcome::Aliased,
            });
        }

        let uid = fingerprint.uid();
        let index = state.repo.identities.len();
        state.repo.identities.push(CanonicalIdentity {
            uid: uid.clone(),
            confidence,
            fingerprint: fingerprint.clone(),
            attributes: query,
        });
        state.by_fingerprint.insert(fingerprint, index);
        state.minted.insert(uid.clone());

        let outcome = if confidence > 0.0 {
            for existing in &roots {
                state.repo.candidates.push(DuplicateCandidate {
                    uid_a: uid.clone(),
                    uid_b: existing.clone(),
                    similarity: confidence,
                });
            }
            info!(
                uid = %uid,
                confidence,
                ?tier,
                candidates = ?roots,
                "Minted identity with duplicate candidates for review"
            );
            ResolutionOutcome::Candidate
        } else {
            debug!(uid = %uid, "Minted new identity");
            ResolutionOutcome::New
        };

        Ok(Resolution {
            uid,
            confidence,
            tier,
            matched_uid: roots.into_iter().next(),
            outcome,
        })
    }

    /// Record operator-confirmed merge `uid_a → uid_b`
    ///
    /// Edges are left unchanged on any failure.
    pub fn mark_merged(&self, uid_a: &str, uid_b: &str) -> Result<(), ResolveError> {
        let mut state = self.write();

        for uid in [uid_a, uid_b] {
            if !state.minted.contains(uid) {
                return Err(ResolveError::UnknownIdentity(uid.to_string()));
            }
        }

        if let Some(path) = state.forest.would_cycle(uid_a, uid_b) {
            warn!(from = %uid_a, to = %uid_b, ?path, "Rejected merge: cycle");
            return Err(ResolveError::CycleDetected {
                uid: uid_a.to_string(),
                path,
            });
        }

        if let Some(target) = state.forest.parent_of(uid_a) {
            return Err(ResolveError::AlreadyMerged {
                uid: uid_a.to_string(),
                target: target.to_string(),
            });
        }

        state.forest.insert(uid_a, uid_b);
        state.repo.merges.push(MergeEdge {
            from_uid: uid_a.to_string(),
            to_uid: uid_b.to_string(),
        });

        info!(from = %uid_a, to = %uid_b, "Recorded identity merge");
        Ok(())
    }

    /// Canonical root of `uid`. A uid with no outgoing edge is its own root.
    pub fn canonical_of(&self, uid: &str) -> Result<String, ResolveError> {
        Ok(self.read().forest.root(uid)?)
    }

    /// Candidates touching `uid`, similarity descending (stable for ties)
    pub fn duplicate_candidates(&self, uid: &str) -> Vec<DuplicateCandidate> {
        let mut found: Vec<DuplicateCandidate> = self
            .read()
            .repo
            .candidates
            .iter()
            .filter(|c| c.uid_a == uid || c.uid_b == uid)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        found
    }

    /// Fingerprint table in first-seen order
    pub fn identities(&self) -> Vec<CanonicalIdentity> {
        self.read().repo.identities.clone()
    }

    pub fn merge_edges(&self) -> Vec<MergeEdge> {
        self.read().repo.merges.clone()
    }

    /// Copy of the resolver-owned repository
    pub fn snapshot(&self) -> IdentityRepository {
        self.read().repo.clone()
    }

    /// Write the repository as pretty JSON (temp file + rename)
    pub fn save_to_path(&self, path: &Path) -> Result<(), ResolveError> {
        let repo = self.snapshot();
        let json = serde_json::to_string_pretty(&repo)
            .map_err(|e| ResolveError::Snapshot(format!("Serialize failed: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ResolveError::Snapshot(format!("Create {} failed: {}", parent.display(), e))
            })?;
        }

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .and_then(|_| std::fs::rename(&tmp_path, path))
            .map_err(|e| ResolveError::Snapshot(format!("Write {} failed: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            identities = repo.identities.len(),
            merges = repo.merges.len(),
            "Saved identity snapshot"
        );
        Ok(())
    }

    /// Restore a resolver from a JSON snapshot written by [`save_to_path`](Self::save_to_path)
    pub fn load_from_path(path: &Path, config: &IdentityConfig) -> Result<Self, ResolveError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ResolveError::Snapshot(format!("Read {} failed: {}", path.display(), e)))?;
        let repo: IdentityRepository = serde_json::from_str(&content).map_err(|e| {
            ResolveError::Snapshot(format!("Parse {} failed: {}", path.display(), e))
        })?;

        info!(
            path = %path.display(),
            identities = repo.identities.len(),
            "Loaded identity snapshot"
        );
        Self::from_snapshot(repo, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flagg() -> AttributeSet {
        AttributeSet::named("Cooper Flagg")
            .with_school("Montverde Academy")
            .with_grad_year(2025)
            .with_birth_date("2006-12-21")
    }

    #[test]
    fn test_empty_attributes_rejected() {
        let resolver = IdentityResolver::default();
        assert!(matches!(
            resolver.resolve(&AttributeSet::default()),
            Err(ResolveError::EmptyAttributes)
        ));
    }

    #[test]
    fn test_first_resolution_mints_with_zero_confidence() {
        let resolver = IdentityResolver::default();
        let r = resolver.resolve(&flagg()).unwrap();
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.outcome, ResolutionOutcome::New);
        assert!(r.uid.starts_with("ath_"));
    }

    #[test]
    fn test_second_resolution_is_tier1() {
        let resolver = IdentityResolver::default();
        let first = resolver.resolve(&flagg()).unwrap();
        let second = resolver.resolve(&flagg()).unwrap();
        assert_eq!(first.uid, second.uid);
        assert_eq!(second.confidence, 1.0);
        assert_eq!(second.outcome, ResolutionOutcome::Existing);
        assert_eq!(resolver.identities()[0].confidence, 1.0);
    }

    #[test]
    fn test_strong_match_aliases() {
        let resolver = IdentityResolver::default();
        let first = resolver.resolve(&flagg()).unwrap();

        let partial = AttributeSet::named("cooper flagg")
            .with_birth_date("12/21/2006")
            .with_grad_year(2025);
        let r = resolver.resolve(&partial).unwrap();

        assert_eq!(r.uid, first.uid);
        assert_eq!(r.tier, Some(2));
        assert_eq!(r.outcome, ResolutionOutcome::Aliased);
        assert_eq!(resolver.identities().len(), 2);
        assert!(resolver.duplicate_candidates(&first.uid).is_empty());
    }

    #[test]
    fn test_weak_match_records_candidate() {
        let resolver = IdentityResolver::default();
        let first = resolver.resolve(&flagg()).unwrap();

        let weak = AttributeSet::named("Cooper Flagg").with_grad_year(2025);
        let r = resolver.resolve(&weak).unwrap();

        assert_ne!(r.uid, first.uid);
        assert_eq!(r.confidence, 0.60);
        assert_eq!(r.outcome, ResolutionOutcome::Candidate);

        let candidates = resolver.duplicate_candidates(&first.uid);
        assert_eq!(
            candidates,
            vec![DuplicateCandidate {
                uid_a: r.uid.clone(),
                uid_b: first.uid.clone(),
                similarity: 0.60,
            }]
        );
    }

    #[test]
    fn test_mark_merged_rejects_self_and_unknown() {
        let resolver = IdentityResolver::default();
        let a = resolver.resolve(&flagg()).unwrap().uid;

        assert!(matches!(
            resolver.mark_merged(&a, &a),
            Err(ResolveError::CycleDetected { .. })
        ));
        assert!(matches!(
            resolver.mark_merged(&a, "ath_missing"),
            Err(ResolveError::UnknownIdentity(_))
        ));
        assert!(resolver.merge_edges().is_empty());
    }

    #[test]
    fn test_known_fingerprint_resolves_to_merge_root() {
        let resolver = IdentityResolver::default();
        let a = resolver.resolve(&flagg()).unwrap().uid;
        let b = resolver
            .resolve(&AttributeSet::named("C. Flagg").with_grad_year(2025))
            .unwrap()
            .uid;
        assert_ne!(a, b);

        resolver.mark_merged(&a, &b).unwrap();

        let again = resolver.resolve(&flagg()).unwrap();
        assert_eq!(again.uid, b);
        assert_eq!(again.outcome, ResolutionOutcome::Existing);
        assert_eq!(again.uid, resolver.canonical_of(&a).unwrap());
        // The fingerprint table keeps the uid it was minted under
        assert_eq!(resolver.identities()[0].uid, a);
    }

    #[test]
    fn test_canonical_of_unknown_uid_is_itself() {
        let resolver = IdentityResolver::default();
        assert_eq!(resolver.canonical_of("ath_nobody").unwrap(), "ath_nobody");
    }
}
