//! Content-addressed hashing for candidate patches (§3 Candidate Patch, §8.1).
//!
//! Unlike the git-object hashing this domain has no format to match — `PatchHash`
//! always uses SHA-256, matching the rationale the AI-object `IntegrityHash` type
//! in this codebase's ancestry used for the same reason: a fixed algorithm keeps
//! integrity/dedup hashing independent of any one repository's object format.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 hash of a candidate patch's diff bytes. `to_short()` yields the
/// 12-hex-character form used in filenames and instance IDs; the full digest
/// is retained in generator metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchHash([u8; 32]);

impl PatchHash {
    pub fn compute(diff_bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(diff_bytes);
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 12-hex-character filename/instance-id form (§4.4, §3 instance_id).
    pub fn to_short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Debug for PatchHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatchHash({})", self.to_hex())
    }
}

impl fmt::Display for PatchHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for PatchHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(format!("invalid hash length: expected 64, got {}", s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| e.to_string())?;
        Ok(Self(bytes))
    }
}

impl Serialize for PatchHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PatchHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_identically() {
        let a = PatchHash::compute(b"--- a\n+++ b\n");
        let b = PatchHash::compute(b"--- a\n+++ b\n");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_hash_differently() {
        let a = PatchHash::compute(b"one");
        let b = PatchHash::compute(b"two");
        assert_ne!(a, b);
    }

    #[test]
    fn short_form_is_twelve_hex_chars() {
        let h = PatchHash::compute(b"diff content");
        assert_eq!(h.to_short().len(), 12);
    }

    #[test]
    fn round_trips_through_string() {
        let h = PatchHash::compute(b"round trip me");
        let parsed: PatchHash = h.to_hex().parse().unwrap();
        assert_eq!(h, parsed);
    }
}
