//! Whole-plaintext SHA-256 digest
//!
//! A second integrity record next to the per-chunk tags, surfaced to callers
//! for anchoring. Computed incrementally; identical to hashing the full buffer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use crate::error::{CryptoError, CryptoResult};
use crate::DIGEST_SIZE;

/// A SHA-256 digest, displayed as 64 lowercase hex chars
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let mut bytes = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CryptoError::MalformedContainer(format!("invalid digest hex '{s}': {e}")))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Running digest fed one chunk at a time.
#[derive(Clone, Default)]
pub struct PlaintextHasher {
    inner: Sha256,
}

impl PlaintextHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Digest {
        Digest(self.inner.finalize().into())
    }
}

/// Hash a whole buffer at once.
pub fn digest(bytes: &[u8]) -> Digest {
    Digest(Sha256::digest(bytes).into())
}

/// Compare two digests without an early exit on the first differing byte.
pub fn verify(expected: &Digest, actual: &Digest) -> bool {
    expected
        .0
        .iter()
        .zip(actual.0.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
