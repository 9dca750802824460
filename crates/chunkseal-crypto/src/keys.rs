//! Symmetric key handle: generation, raw export/import, text form for custody

use aes_gcm::{Aes256Gcm, KeyInit};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::provider::{CryptoProvider, OsProvider};
use crate::KEY_SIZE;

/// Algorithm identifier carried by every key handle
pub const KEY_ALGORITHM: &str = "AES-256-GCM";

/// A 256-bit AES-GCM key owned by the caller. Zeroized on drop.
///
/// The engine never persists a key; sessions build their cipher from it and
/// keep no reference once they finish.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Generate a fresh key from the given random source.
    pub fn generate(provider: &dyn CryptoProvider) -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        provider.fill_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Rebuild a key handle from raw material supplied by the caller.
    pub fn import_raw(raw: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(raw.len()))?;
        Ok(Self { bytes })
    }

    /// Raw key material for caller-controlled custody. Does not invalidate the key.
    pub fn export_raw(&self) -> [u8; KEY_SIZE] {
        self.bytes
    }

    pub fn algorithm(&self) -> &'static str {
        KEY_ALGORITHM
    }

    pub fn len_bits(&self) -> usize {
        KEY_SIZE * 8
    }

    /// Standard base64 of the raw key, for share links and clipboard custody.
    pub fn to_base64(&self) -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        STANDARD.encode(self.bytes)
    }

    /// Inverse of [`to_base64`](Self::to_base64). Text that is not base64
    /// fails with `InvalidKeyEncoding`; the wrong decoded size with `InvalidKeyLength`.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let key = Self::import_raw(&raw);
        raw.zeroize();
        key
    }

    pub(crate) fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new((&self.bytes).into())
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &KEY_ALGORITHM)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a key from the platform CSPRNG.
pub fn generate_key() -> CryptoResult<SymmetricKey> {
    SymmetricKey::generate(&OsProvider)
}

/// Raw 32-byte export of `key`.
pub fn export_raw(key: &SymmetricKey) -> [u8; KEY_SIZE] {
    key.export_raw()
}

/// Reconstruct a key from exactly 32 raw bytes.
pub fn import_raw(raw: &[u8]) -> CryptoResult<SymmetricKey> {
    SymmetricKey::import_raw(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::UnavailableProvider;
    use crate::provider::SeededProvider;

    #[test]
    fn test_key_generation() {
        let k1 = generate_key().unwrap();
        let k2 = generate_key().unwrap();
        assert_ne!(k1.export_raw(), k2.export_raw(), "random keys must differ");
        assert_eq!(k1.len_bits(), 256);
        assert_eq!(k1.algorithm(), "AES-256-GCM");
    }

    #[test]
    fn test_export_import_roundtrip() {
        let key = SymmetricKey::generate(&SeededProvider::new(1)).unwrap();
        let raw = export_raw(&key);
        let restored = import_raw(&raw).unwrap();
        assert_eq!(restored.export_raw(), raw);
        // export leaves the original usable
        assert_eq!(key.export_raw(), raw);
    }

    #[test]
    fn test_import_wrong_length() {
        for len in [0usize, 16, 31, 33, 64] {
            let err = import_raw(&vec![7u8; len]).unwrap_err();
            assert!(
                matches!(err, CryptoError::InvalidKeyLength(n) if n == len),
                "length {len} must be rejected"
            );
        }
    }

    #[test]
    fn test_base64_roundtrip() {
        let key = generate_key().unwrap();
        let text = key.to_base64();
        let back = SymmetricKey::from_base64(&text).unwrap();
        assert_eq!(back.export_raw(), key.export_raw());
    }

    #[test]
    fn test_base64_short_key_rejected() {
        let err = SymmetricKey::from_base64("AAAA").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength(3)));
    }

    #[test]
    fn test_base64_garbage_is_an_encoding_error() {
        let err = SymmetricKey::from_base64("not base64 at all!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyEncoding(_)), "got {err:?}");
    }

    #[test]
    fn test_generate_without_entropy() {
        let err = SymmetricKey::generate(&UnavailableProvider).unwrap_err();
        assert!(matches!(err, CryptoError::EntropyUnavailable(_)));
    }

    #[test]
    fn test_debug_redacts_material() {
        let key = SymmetricKey::import_raw(&[0xAB; KEY_SIZE]).unwrap();
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }
}
