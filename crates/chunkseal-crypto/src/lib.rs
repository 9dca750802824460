//! chunkseal-crypto: chunked, authenticated file encryption with bounded memory
//!
//! Architecture: fixed-size chunks, each sealed with AES-256-GCM under one key
//!
//! Pipeline: plaintext → bounded chunk read → SHA-256 (running) → encrypt → sink
//!
//! Per-session material:
//! ```text
//! SymmetricKey (256-bit, caller-owned, never persisted here)
//!   └── BaseNonce (96-bit random, drawn once per session)
//!       └── Chunk nonce = base[0..8] || chunk_index (u32 BE)
//!           └── Chunk AEAD: AES-256-GCM (AAD = chunk_index || final, when bound)
//! Container: base nonce, chunk size, explicit chunk length table, total size, mime, digest
//! ```

pub mod chunk;
pub mod container;
pub mod digest;
pub mod error;
pub mod files;
pub mod keys;
pub mod nonce;
pub mod oneshot;
pub mod provider;
pub mod stream;

pub use chunk::{decrypt_chunk, encrypt_chunk, ChunkBinding, ChunkCodec};
pub use container::{Container, CONTAINER_VERSION};
pub use digest::{Digest, PlaintextHasher};
pub use error::{CryptoError, CryptoResult};
pub use files::{decrypt_file, encrypt_file};
pub use keys::{export_raw, generate_key, import_raw, SymmetricKey};
pub use nonce::{BaseNonce, Nonce96, NonceSequencer};
pub use oneshot::{open_bytes, seal_bytes, SealedBytes};
pub use provider::{CryptoProvider, OsProvider, SeededProvider};
pub use stream::{
    DecryptSession, EncryptSession, EngineOptions, ProgressFn, SessionState, StreamingEngine,
};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the SHA-256 plaintext digest
pub const DIGEST_SIZE: usize = 32;

/// Most chunks one container can address (the count field is 32-bit)
pub const MAX_CHUNKS: u64 = u32::MAX as u64;
