//! Input fingerprints for ingest processes
//!
//! A fingerprint identifies an ingest process by the *set* of file versions it
//! consumes. Two requests over the same versions, submitted in any order and
//! with any repetition, produce the same fingerprint.
//!
//! The digest is SHA-256 over the lexicographically sorted, de-duplicated
//! version ids. Each id is length-prefixed so that no two distinct sets can
//! concatenate to the same byte stream (`["ab", "c"]` vs `["a", "bc"]`).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CreatorError, Result};

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Deterministic digest over a set of version identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputFingerprint(String);

impl InputFingerprint {
    /// Compute the fingerprint of a collection of version ids
    pub fn from_versions<I, S>(version_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let canonical: BTreeSet<String> = version_ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();

        let mut hasher = Sha256::new();
        for id in &canonical {
            hasher.update((id.len() as u64).to_le_bytes());
            hasher.update(id.as_bytes());
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a previously stored fingerprint
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let well_formed = value.len() == FINGERPRINT_HEX_LEN
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));

        if well_formed {
            Ok(Self(value))
        } else {
            Err(CreatorError::InvalidFingerprint(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InputFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InputFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
