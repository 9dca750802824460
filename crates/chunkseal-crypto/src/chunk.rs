//! Per-chunk AES-256-GCM encryption/decryption
//!
//! Encrypted chunk format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The nonce is never stored with the chunk: it is recomputed from the
//! container's base nonce and the chunk index. With position binding enabled
//! the AAD is `chunk_index (4 bytes, big-endian) || final (1 byte)`, which
//! rejects reordered chunks and a stream cut short after any chunk.

use aes_gcm::{
    aead::{Aead, Payload},
    Aes256Gcm, Nonce,
};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;
use crate::nonce::{counter_of, Nonce96};
use crate::TAG_SIZE;

/// What each chunk's associated data commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkBinding {
    /// Empty AAD
    None,
    /// Chunk index and final-chunk flag
    #[default]
    Position,
}

impl ChunkBinding {
    /// Build the AAD for one chunk.
    pub fn aad(self, index: u32, is_final: bool) -> Vec<u8> {
        match self {
            ChunkBinding::None => Vec::new(),
            ChunkBinding::Position => {
                let mut aad = Vec::with_capacity(5);
                aad.extend_from_slice(&index.to_be_bytes());
                aad.push(u8::from(is_final));
                aad
            }
        }
    }

    pub fn from_enabled(bind_position: bool) -> Self {
        if bind_position {
            ChunkBinding::Position
        } else {
            ChunkBinding::None
        }
    }
}

/// AES-256-GCM cipher keyed once per session and reused for every chunk.
pub struct ChunkCodec {
    cipher: Aes256Gcm,
}

impl ChunkCodec {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: key.cipher(),
        }
    }

    /// Encrypt one chunk. Output is `plaintext.len() + 16` bytes.
    pub fn seal(&self, nonce: &Nonce96, aad: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.cipher
            .encrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::InvalidChunkSize(plaintext.len() as u64))
    }

    /// Decrypt and authenticate one chunk.
    ///
    /// A tag failure is reported with the index held in the nonce's counter
    /// field and must end the whole session.
    pub fn open(&self, nonce: &Nonce96, aad: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::InvalidChunkLength(ciphertext.len()));
        }

        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed {
                index: counter_of(nonce),
            })
    }
}

/// Encrypt a single chunk without associated data.
pub fn encrypt_chunk(key: &SymmetricKey, nonce: &Nonce96, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    ChunkCodec::new(key).seal(nonce, &[], plaintext)
}

/// Decrypt a single chunk produced by [`encrypt_chunk`].
pub fn decrypt_chunk(key: &SymmetricKey, nonce: &Nonce96, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    ChunkCodec::new(key).open(nonce, &[], ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use crate::nonce::{derive, BaseNonce};

    fn nonce_for(index: u64) -> Nonce96 {
        derive(&BaseNonce::from_bytes([0x11; 12]), index).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_key().unwrap();
        let nonce = nonce_for(0);
        let plaintext = b"hello, sealed world!";

        let encrypted = encrypt_chunk(&key, &nonce, plaintext).unwrap();
        let decrypted = decrypt_chunk(&key, &nonce, &encrypted).unwrap();

        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = generate_key().unwrap();
        let nonce = nonce_for(0);

        let encrypted = encrypt_chunk(&key, &nonce, b"").unwrap();
        assert_eq!(encrypted.len(), TAG_SIZE);
        let decrypted = decrypt_chunk(&key, &nonce, &encrypted).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_encrypted_size() {
        let key = generate_key().unwrap();
        let encrypted = encrypt_chunk(&key, &nonce_for(0), &[0u8; 1000]).unwrap();

        // plaintext (1000) + tag (16)
        assert_eq!(encrypted.len(), 1000 + TAG_SIZE);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let key1 = generate_key().unwrap();
        let key2 = generate_key().unwrap();
        let nonce = nonce_for(0);

        let encrypted = encrypt_chunk(&key1, &nonce, b"secret data").unwrap();
        let err = decrypt_chunk(&key2, &nonce, &encrypted).unwrap_err();

        assert!(matches!(err, CryptoError::AuthenticationFailed { index: 0 }));
    }

    #[test]
    fn test_decrypt_wrong_index() {
        let key = generate_key().unwrap();

        let encrypted = encrypt_chunk(&key, &nonce_for(4), b"secret data").unwrap();
        let err = decrypt_chunk(&key, &nonce_for(5), &encrypted).unwrap_err();

        assert!(matches!(err, CryptoError::AuthenticationFailed { index: 5 }));
    }

    #[test]
    fn test_tampered_ciphertext_and_tag() {
        let key = generate_key().unwrap();
        let nonce = nonce_for(2);
        let encrypted = encrypt_chunk(&key, &nonce, b"secret data").unwrap();

        for pos in [0, encrypted.len() / 2, encrypted.len() - 1] {
            let mut tampered = encrypted.clone();
            tampered[pos] ^= 0x01;
            let err = decrypt_chunk(&key, &nonce, &tampered).unwrap_err();
            assert!(
                matches!(err, CryptoError::AuthenticationFailed { index: 2 }),
                "bit flip at {pos} must fail"
            );
        }
    }

    #[test]
    fn test_short_ciphertext() {
        let key = generate_key().unwrap();
        let err = decrypt_chunk(&key, &nonce_for(0), &[0u8; TAG_SIZE - 1]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidChunkLength(15)));
    }

    #[test]
    fn test_position_binding_rejects_wrong_final_flag() {
        let key = generate_key().unwrap();
        let codec = ChunkCodec::new(&key);
        let nonce = nonce_for(1);
        let binding = ChunkBinding::Position;

        let encrypted = codec.seal(&nonce, &binding.aad(1, false), b"middle").unwrap();
        assert!(codec.open(&nonce, &binding.aad(1, false), &encrypted).is_ok());
        assert!(codec.open(&nonce, &binding.aad(1, true), &encrypted).is_err());
        assert!(codec.open(&nonce, &ChunkBinding::None.aad(1, false), &encrypted).is_err());
    }

    #[test]
    fn test_binding_aad_layout() {
        assert!(ChunkBinding::None.aad(9, true).is_empty());
        assert_eq!(ChunkBinding::Position.aad(0x0A0B0C0D, true), vec![0x0A, 0x0B, 0x0C, 0x0D, 1]);
        assert_eq!(ChunkBinding::from_enabled(false), ChunkBinding::None);
    }
}
