use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failure taxonomy of an encryption or decryption session.
///
/// Every variant except `Io` is terminal for the session that raised it.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("invalid key length: {0} bytes (expected 32)")]
    InvalidKeyLength(usize),

    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("chunk count exceeded: {chunks} chunks needed, at most {max} addressable")]
    ChunkCountExceeded { chunks: u64, max: u64 },

    #[error("authentication failed for chunk {index}")]
    AuthenticationFailed { index: u32 },

    #[error("plaintext digest mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("invalid chunk length: {0} bytes is shorter than the authentication tag")]
    InvalidChunkLength(usize),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("ciphertext continues past the last declared chunk")]
    TrailingCiphertext,

    #[error("session cancelled")]
    Cancelled,

    #[error("session already finished")]
    SessionFinished,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Only collaborator I/O failures may be retried, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CryptoError::Io(_))
    }
}
