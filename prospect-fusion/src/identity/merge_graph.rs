//! Operator-confirmed merge forest
//!
//! Each uid has at most one outgoing edge toward the uid it was merged into.
//! Walks are bounded by the number of edges, so a corrupt (cyclic) edge set is
//! reported instead of looping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Directed merge edge `from_uid → to_uid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeEdge {
    pub from_uid: String,
    pub to_uid: String,
}

/// Walk from a uid ended in a cycle; `path` is the walk up to the repeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath {
    pub uid: String,
    pub path: Vec<String>,
}

/// Parent map of the merge forest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeForest {
    parent: BTreeMap<String, String>,
}

impl MergeForest {
    /// Rebuild from persisted edges. Duplicate sources keep the last edge.
    pub fn from_edges(edges: &[MergeEdge]) -> Self {
        let parent = edges
            .iter()
            .map(|e| (e.from_uid.clone(), e.to_uid.clone()))
            .collect();
        Self { parent }
    }

    pub fn parent_of(&self, uid: &str) -> Option<&str> {
        self.parent.get(uid).map(String::as_str)
    }

    /// Follow parent edges to a root
    ///
    /// A uid with no outgoing edge is its own root.
    pub fn root(&self, uid: &str) -> Result<String, CyclePath> {
        let mut path = vec![uid.to_string()];
        let mut current = uid;

        // A cycle-free walk visits at most len() + 1 nodes
        for _ in 0..=self.parent.len() {
            match self.parent.get(current) {
                None => return Ok(current.to_string()),
                Some(next) => {
                    if path.iter().any(|p| p == next) {
                        path.push(next.clone());
                        return Err(CyclePath {
                            uid: uid.to_string(),
                            path,
                        });
                    }
                    path.push(next.clone());
                    current = next.as_str();
                }
            }
        }

        Err(CyclePath {
            uid: uid.to_string(),
            path,
        })
    }

    /// Path `from → … → to` that would close a cycle if `from → to` were added
    pub fn would_cycle(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string(), to.to_string()]);
        }

        let mut path = vec![from.to_string(), to.to_string()];
        let mut current = to;
        for _ in 0..=self.parent.len() {
            match self.parent.get(current) {
                None => return None,
                Some(next) => {
                    path.push(next.clone());
                    if next == from {
                        return Some(path);
                    }
                    current = next.as_str();
                }
            }
        }
        // Existing edges already loop; adding anything here is unsafe
        Some(path)
    }

    /// Insert `from → to`. Callers check [`would_cycle`](Self::would_cycle) first.
    pub fn insert(&mut self, from: &str, to: &str) {
        self.parent.insert(from.to_string(), to.to_string());
    }

    /// Fail on the first uid whose walk does not terminate
    pub fn validate(&self) -> Result<(), CyclePath> {
        for uid in self.parent.keys() {
            self.root(uid)?;
        }
        Ok(())
    }
}
