//! Configuration fingerprints.
//!
//! A fingerprint is a checksum over the raw configuration text. The
//! reconciler compares fingerprints to decide whether a registration must
//! be replaced; two different texts hashing to the same value would hide a
//! change, which is an accepted risk.

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 over the raw configuration components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    /// Fingerprint an ordered list of raw text components.
    ///
    /// Each component is terminated by a NUL byte so that moving text from
    /// one component into its neighbour changes the fingerprint.
    pub fn of_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first 12 hex chars are plenty for log lines.
        let short: String = self.0.chars().take(12).collect();
        f.write_str(&short)
    }
}
