//! Deterministic attribute fingerprints and the uids derived from them
//!
//! A fingerprint is the ordered list of non-empty normalized fields
//! (name, birth_date, school, grad_year, height, weight, country), each rendered
//! `key=value` and joined with `|`. State is deliberately not part of it.

use super::attributes::AttributeSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix for canonical athlete uids
pub const UID_PREFIX: &str = "ath_";

/// Bytes of the SHA-256 digest kept in a uid
const UID_DIGEST_BYTES: usize = 16;

/// Resolution key for an attribute set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of the normalized form of `attrs`
    pub fn from_attributes(attrs: &AttributeSet) -> Self {
        let attrs = attrs.normalized();

        let parts: Vec<String> = [
            ("name", attrs.name.clone()),
            ("birth_date", attrs.birth_date.clone()),
            ("school", attrs.school.clone()),
            ("grad_year", attrs.grad_year.map(|y| y.to_string())),
            ("height", attrs.height.map(|h| h.to_string())),
            ("weight", attrs.weight.map(|w| w.to_string())),
            ("country", attrs.country.clone()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| format!("{}={}", key, v)))
        .collect();

        Self(parts.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no fingerprinted field was present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable uid for this fingerprint: `ath_` + first 16 bytes of SHA-256, hex
    pub fn uid(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        format!("{}{}", UID_PREFIX, hex::encode(&digest[..UID_DIGEST_BYTES]))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_field_order() {
        let attrs = AttributeSet::named("Cooper Flagg")
            .with_school("Montverde Academy")
            .with_grad_year(2025)
            .with_birth_date("2006-12-21");

        assert_eq!(
            Fingerprint::from_attributes(&attrs).as_str(),
            "name=cooper flagg|birth_date=2006-12-21|school=montverde academy|grad_year=2025"
        );
    }

    #[test]
    fn test_state_not_fingerprinted() {
        let a = AttributeSet::named("Jon Smith").with_grad_year(2025);
        let b = a.clone().with_state("TX");
        assert_eq!(Fingerprint::from_attributes(&a), Fingerprint::from_attributes(&b));
    }

    #[test]
    fn test_empty_fingerprint() {
        assert!(Fingerprint::from_attributes(&AttributeSet::default()).is_empty());
    }

    #[test]
    fn test_uid_is_stable_and_prefixed() {
        let fp = Fingerprint::from_attributes(&AttributeSet::named("Cooper Flagg"));
        let uid = fp.uid();
        assert!(uid.starts_with(UID_PREFIX));
        assert_eq!(uid.len(), UID_PREFIX.len() + UID_DIGEST_BYTES * 2);
        assert_eq!(uid, fp.clone().uid());
        assert!(uid[UID_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_distinct_fingerprints_distinct_uids() {
        let a = Fingerprint::from_attributes(&AttributeSet::named("Cooper Flagg"));
        let b = Fingerprint::from_attributes(&AttributeSet::named("Ace Bailey"));
        assert_ne!(a.uid(), b.uid());
    }
}
