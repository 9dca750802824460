//! Single-shot sealing for small payloads (tokens, metadata records)
//!
//! Output: a fresh random 96-bit nonce plus `[ciphertext][16-byte tag]`.
//! Unlike chunked sessions there is no base nonce or counter; every call
//! draws a new nonce from the provider.

use crate::chunk::ChunkCodec;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;
use crate::nonce::Nonce96;
use crate::provider::CryptoProvider;
use crate::NONCE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBytes {
    pub nonce: Nonce96,
    pub ciphertext: Vec<u8>,
}

impl SealedBytes {
    /// `[12-byte nonce][ciphertext + tag]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::InvalidChunkLength(data.len()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        let mut n = [0u8; NONCE_SIZE];
        n.copy_from_slice(nonce);
        Ok(Self {
            nonce: n,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt a small payload in one call.
pub fn seal_bytes(
    provider: &dyn CryptoProvider,
    key: &SymmetricKey,
    plaintext: &[u8],
) -> CryptoResult<SealedBytes> {
    let mut nonce = [0u8; NONCE_SIZE];
    provider.fill_random(&mut nonce)?;
    let ciphertext = ChunkCodec::new(key).seal(&nonce, &[], plaintext)?;
    Ok(SealedBytes { nonce, ciphertext })
}

/// Decrypt a payload produced by [`seal_bytes`].
pub fn open_bytes(key: &SymmetricKey, sealed: &SealedBytes) -> CryptoResult<Vec<u8>> {
    ChunkCodec::new(key)
        .open(&sealed.nonce, &[], &sealed.ciphertext)
        .map_err(|e| match e {
            // random nonce: its counter bytes are not an index
            CryptoError::AuthenticationFailed { .. } => CryptoError::AuthenticationFailed { index: 0 },
            other => other,
        })
}
