//! Injected randomness capability
//!
//! Every component that needs fresh random bytes (key generation, base nonces,
//! one-shot nonces) takes a `CryptoProvider` instead of reaching for a global
//! RNG, so tests can run sessions with reproducible keys and nonces.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;

use crate::error::{CryptoError, CryptoResult};

/// Source of cryptographically secure random bytes.
pub trait CryptoProvider: Send + Sync {
    /// Fill `buf` completely or fail with `EntropyUnavailable`.
    /// Implementations must never fall back to a weaker source.
    fn fill_random(&self, buf: &mut [u8]) -> CryptoResult<()>;
}

/// Platform CSPRNG (getrandom under the hood).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProvider;

impl CryptoProvider for OsProvider {
    fn fill_random(&self, buf: &mut [u8]) -> CryptoResult<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))
    }
}

/// Deterministic provider for tests and reproducible fixtures.
///
/// Never use this to protect real data: anyone who knows the seed knows
/// every key and nonce it produces.
pub struct SeededProvider {
    rng: Mutex<StdRng>,
}

impl SeededProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl CryptoProvider for SeededProvider {
    fn fill_random(&self, buf: &mut [u8]) -> CryptoResult<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| CryptoError::EntropyUnavailable("seeded rng lock poisoned".into()))?;
        rng.try_fill_bytes(buf)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))
    }
}

impl std::fmt::Debug for SeededProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededProvider").finish_non_exhaustive()
    }
}
