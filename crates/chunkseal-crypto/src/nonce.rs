//! Per-chunk nonce derivation
//!
//! Layout of every chunk nonce (96 bits):
//! ```text
//! [8 bytes: base nonce prefix, random per session][4 bytes: chunk index, big-endian]
//! ```
//!
//! For a fixed base the mapping index → nonce is injective over the whole
//! 32-bit range. The only uniqueness requirement left to callers is that a
//! (base, index) pair is never encrypted twice under the same key, which
//! `NonceSequencer` enforces by only ever moving forward.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, CryptoResult};
use crate::provider::CryptoProvider;
use crate::{MAX_CHUNKS, NONCE_SIZE};

/// Bytes of the base nonce copied verbatim into each chunk nonce
pub const NONCE_PREFIX_SIZE: usize = 8;

/// A 96-bit AEAD nonce
pub type Nonce96 = [u8; NONCE_SIZE];

/// Random value drawn once per encryption session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaseNonce([u8; NONCE_SIZE]);

impl BaseNonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for BaseNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BaseNonce({})", hex::encode(self.0))
    }
}

impl Serialize for BaseNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BaseNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; NONCE_SIZE];
        hex::decode_to_slice(&s, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

/// Draw a fresh base nonce. Call once per encryption session, never per chunk.
pub fn start(provider: &dyn CryptoProvider) -> CryptoResult<BaseNonce> {
    let mut bytes = [0u8; NONCE_SIZE];
    provider.fill_random(&mut bytes)?;
    Ok(BaseNonce(bytes))
}

/// Nonce for chunk `index` of the session started with `base`.
///
/// Indices beyond the 32-bit counter field are a hard error, never a wrap.
pub fn derive(base: &BaseNonce, index: u64) -> CryptoResult<Nonce96> {
    let counter = u32::try_from(index).map_err(|_| CryptoError::ChunkCountExceeded {
        chunks: index.saturating_add(1),
        max: MAX_CHUNKS,
    })?;

    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..NONCE_PREFIX_SIZE].copy_from_slice(&base.0[..NONCE_PREFIX_SIZE]);
    nonce[NONCE_PREFIX_SIZE..].copy_from_slice(&counter.to_be_bytes());
    Ok(nonce)
}

/// Chunk index encoded in the counter field of a derived nonce.
pub(crate) fn counter_of(nonce: &Nonce96) -> u32 {
    let mut counter = [0u8; 4];
    counter.copy_from_slice(&nonce[NONCE_PREFIX_SIZE..]);
    u32::from_be_bytes(counter)
}

/// Hands out nonces for one encryption session, strictly in index order.
#[derive(Debug)]
pub struct NonceSequencer {
    base: BaseNonce,
    next: u64,
    limit: u64,
}

impl NonceSequencer {
    /// Start a session with a freshly drawn base nonce.
    pub fn start(provider: &dyn CryptoProvider) -> CryptoResult<Self> {
        Ok(Self::with_limit(start(provider)?, MAX_CHUNKS))
    }

    pub(crate) fn with_limit(base: BaseNonce, limit: u64) -> Self {
        Self {
            base,
            next: 0,
            limit: limit.min(MAX_CHUNKS),
        }
    }

    pub fn base(&self) -> BaseNonce {
        self.base
    }

    /// Number of nonces handed out so far
    pub fn issued(&self) -> u64 {
        self.next
    }

    /// Next (index, nonce) pair. Each index is issued at most once.
    pub fn next_nonce(&mut self) -> CryptoResult<(u32, Nonce96)> {
        if self.next >= self.limit {
            return Err(CryptoError::ChunkCountExceeded {
                chunks: self.next + 1,
                max: self.limit,
            });
        }
        let nonce = derive(&self.base, self.next)?;
        let index = self.next as u32;
        self.next += 1;
        Ok((index, nonce))
    }
}
