//! Confidence tier rules
//!
//! The tier table is an ordered slice of rules evaluated against one candidate
//! identity. The first rule whose predicate holds decides the confidence.
//! "Match" means both sides carry the normalized field and the values are equal.
//!
//! | Tier | Condition | Confidence |
//! |---|---|---|
//! | 1 | name + birth_date + school | 1.00 |
//! | 2 | name + birth_date + grad_year | 0.95 |
//! | 3 | name + grad_year + height + weight | 0.90 |
//! | 4 | name + school + grad_year | 0.80 |
//! | 5 | name + grad_year + state | 0.75 |
//! | 6 | name + grad_year | 0.60 |
//! | 7 | fuzzy name + school | 0.50 |

use super::attributes::AttributeSet;

/// Inputs to a tier predicate. Both attribute sets are already normalized.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub query: &'a AttributeSet,
    pub candidate: &'a AttributeSet,
    /// Minimum normalized Levenshtein ratio for a fuzzy name match
    pub fuzzy_threshold: f64,
}

impl MatchContext<'_> {
    fn name(&self) -> bool {
        both_equal(&self.query.name, &self.candidate.name)
    }

    fn birth_date(&self) -> bool {
        both_equal(&self.query.birth_date, &self.candidate.birth_date)
    }

    fn school(&self) -> bool {
        both_equal(&self.query.school, &self.candidate.school)
    }

    fn grad_year(&self) -> bool {
        both_equal(&self.query.grad_year, &self.candidate.grad_year)
    }

    fn height(&self) -> bool {
        both_equal(&self.query.height, &self.candidate.height)
    }

    fn weight(&self) -> bool {
        both_equal(&self.query.weight, &self.candidate.weight)
    }

    fn state(&self) -> bool {
        both_equal(&self.query.state, &self.candidate.state)
    }

    fn fuzzy_name(&self) -> bool {
        match (&self.query.name, &self.candidate.name) {
            (Some(a), Some(b)) => names_match(a, b, self.fuzzy_threshold),
            _ => false,
        }
    }
}

/// One row of the tier table
#[derive(Clone, Copy)]
pub struct MatchRule {
    pub tier: u8,
    pub confidence: f64,
    pub description: &'static str,
    pub predicate: fn(&MatchContext<'_>) -> bool,
}

/// Tier table in priority order
pub const TIER_RULES: &[MatchRule] = &[
    MatchRule {
        tier: 1,
        confidence: 1.00,
        description: "name + birth_date + school",
        predicate: |c| c.name() && c.birth_date() && c.school(),
    },
    MatchRule {
        tier: 2,
        confidence: 0.95,
        description: "name + birth_date + grad_year",
        predicate: |c| c.name() && c.birth_date() && c.grad_year(),
    },
    MatchRule {
        tier: 3,
        confidence: 0.90,
        description: "name + grad_year + height + weight",
        predicate: |c| c.name() && c.grad_year() && c.height() && c.weight(),
    },
    MatchRule {
        tier: 4,
        confidence: 0.80,
        description: "name + school + grad_year",
        predicate: |c| c.name() && c.school() && c.grad_year(),
    },
    MatchRule {
        tier: 5,
        confidence: 0.75,
        description: "name + grad_year + state",
        predicate: |c| c.name() && c.grad_year() && c.state(),
    },
    MatchRule {
        tier: 6,
        confidence: 0.60,
        description: "name + grad_year",
        predicate: |c| c.name() && c.grad_year(),
    },
    MatchRule {
        tier: 7,
        confidence: 0.50,
        description: "similar name + school",
        predicate: |c| c.fuzzy_name() && c.school(),
    },
];

/// Result of evaluating the tier table against one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierMatch {
    pub tier: u8,
    pub confidence: f64,
}

/// First matching tier for `query` against `candidate`, or `None` (confidence 0.00)
///
/// Both sets must already be normalized.
pub fn evaluate(
    query: &AttributeSet,
    candidate: &AttributeSet,
    fuzzy_threshold: f64,
) -> Option<TierMatch> {
    let ctx = MatchContext {
        query,
        candidate,
        fuzzy_threshold,
    };

    TIER_RULES
        .iter()
        .find(|rule| (rule.predicate)(&ctx))
        .map(|rule| TierMatch {
            tier: rule.tier,
            confidence: rule.confidence,
        })
}

/// Normalized Levenshtein ratio between two already-normalized names
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Exact or similar-enough normalized names
pub fn names_match(a: &str, b: &str, threshold: f64) -> bool {
    a == b || name_similarity(a, b) >= threshold
}

fn both_equal<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}
