//! Streaming engine: bounded-memory encrypt and decrypt sessions
//!
//! Encryption pulls at most `chunk_size` plaintext bytes at a time, plus one
//! chunk of look-ahead so the final chunk can be flagged in its AAD. Decryption
//! walks the container's declared lengths and reads exactly `len + 16` bytes
//! per chunk. Encryption holds at most three chunk-sized buffers (current,
//! look-ahead, sealed output); decryption holds one ciphertext chunk and its
//! plaintext.
//!
//! Session states:
//! ```text
//! Idle → Reading → Encrypting/Decrypting → Emitting → (Reading …) → Done | Failed
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use chunkseal_core::config::EngineConfig;

use crate::chunk::{ChunkBinding, ChunkCodec};
use crate::container::{expected_chunk_count, Container};
use crate::digest::{verify, Digest, PlaintextHasher};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;
use crate::nonce::{derive, NonceSequencer};
use crate::provider::{CryptoProvider, OsProvider};
use crate::{MAX_CHUNKS, TAG_SIZE};

/// Progress observer: (bytes_done, chunks_done). Purely informational.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Reading,
    Encrypting,
    Decrypting,
    Emitting,
    Done,
    Failed,
}

/// Engine-wide settings shared by every session it starts.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum plaintext bytes per chunk
    pub chunk_size: u32,
    pub binding: ChunkBinding,
    pub default_mime: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chunk_size: chunkseal_core::DEFAULT_CHUNK_SIZE,
            binding: ChunkBinding::Position,
            default_mime: chunkseal_core::DEFAULT_MIME.into(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(cfg: &EngineConfig) -> CryptoResult<Self> {
        let chunk_size = u32::try_from(cfg.chunk_size)
            .ok()
            .filter(|&s| s > 0)
            .ok_or(CryptoError::InvalidChunkSize(cfg.chunk_size))?;
        Ok(Self {
            chunk_size,
            binding: ChunkBinding::from_enabled(cfg.bind_chunk_position),
            default_mime: cfg.default_mime.clone(),
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_binding(mut self, binding: ChunkBinding) -> Self {
        self.binding = binding;
        self
    }
}

/// Starts encryption and decryption sessions. Holds no key material.
#[derive(Clone)]
pub struct StreamingEngine {
    provider: Arc<dyn CryptoProvider>,
    options: EngineOptions,
    chunk_limit: u64,
}

impl StreamingEngine {
    pub fn new(provider: Arc<dyn CryptoProvider>, options: EngineOptions) -> CryptoResult<Self> {
        if options.chunk_size == 0 {
            return Err(CryptoError::InvalidChunkSize(0));
        }
        Ok(Self {
            provider,
            options,
            chunk_limit: MAX_CHUNKS,
        })
    }

    /// Engine backed by the platform CSPRNG.
    pub fn from_config(cfg: &EngineConfig) -> CryptoResult<Self> {
        Self::new(Arc::new(OsProvider), EngineOptions::from_config(cfg)?)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn provider(&self) -> &dyn CryptoProvider {
        self.provider.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn with_chunk_limit(mut self, limit: u64) -> Self {
        self.chunk_limit = limit;
        self
    }

    /// New encryption session under `key`, using the engine's default mime.
    pub fn encrypt_session(&self, key: &SymmetricKey) -> EncryptSession {
        EncryptSession {
            codec: ChunkCodec::new(key),
            provider: Arc::clone(&self.provider),
            chunk_size: self.options.chunk_size,
            binding: self.options.binding,
            mime: self.options.default_mime.clone(),
            size_hint: None,
            chunk_limit: self.chunk_limit,
            state: SessionState::Idle,
        }
    }

    /// New decryption session for one container.
    pub fn decrypt_session<'c>(&self, key: &SymmetricKey, container: &'c Container) -> DecryptSession<'c> {
        DecryptSession {
            codec: ChunkCodec::new(key),
            container,
            state: SessionState::Idle,
        }
    }

    /// Encrypt an in-memory buffer. Returns the container and the ciphertext blob.
    pub async fn encrypt_to_vec(
        &self,
        key: &SymmetricKey,
        plaintext: &[u8],
        mime: Option<&str>,
    ) -> CryptoResult<(Container, Vec<u8>)> {
        let mut session = self
            .encrypt_session(key)
            .with_size_hint(plaintext.len() as u64);
        if let Some(mime) = mime {
            session = session.with_mime(mime);
        }
        let mut blob = Vec::with_capacity(plaintext.len() + TAG_SIZE);
        let container = session.run(plaintext, &mut blob, None, None).await?;
        Ok((container, blob))
    }

    /// Decrypt an in-memory blob. Nothing is returned unless the whole
    /// session succeeds, digest included.
    pub async fn decrypt_to_vec(
        &self,
        key: &SymmetricKey,
        container: &Container,
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let mut plaintext = Vec::new();
        self.decrypt_session(key, container)
            .run(ciphertext, &mut plaintext, None, None)
            .await?;
        Ok(plaintext)
    }
}

impl std::fmt::Debug for StreamingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingEngine")
            .field("options", &self.options)
            .field("chunk_limit", &self.chunk_limit)
            .finish_non_exhaustive()
    }
}

/// One encryption pass: plaintext source → ciphertext sink → [`Container`].
pub struct EncryptSession {
    codec: ChunkCodec,
    provider: Arc<dyn CryptoProvider>,
    chunk_size: u32,
    binding: ChunkBinding,
    mime: String,
    size_hint: Option<u64>,
    chunk_limit: u64,
    state: SessionState,
}

impl EncryptSession {
    /// Content-type hint recorded in the container.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    /// Known plaintext length; lets chunk-count overflow fail before any read.
    pub fn with_size_hint(mut self, len: u64) -> Self {
        self.size_hint = Some(len);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// On any error the session ends `Failed` and whatever reached `sink`
    /// must be discarded by the caller.
    pub async fn run<R, W>(
        &mut self,
        source: R,
        sink: W,
        progress: Option<&ProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> CryptoResult<Container>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.state != SessionState::Idle {
            return Err(CryptoError::SessionFinished);
        }

        match self.encrypt(source, sink, progress, cancel).await {
            Ok(container) => {
                self.transition(SessionState::Done);
                info!(
                    chunks = container.chunk_count(),
                    bytes = container.total_size(),
                    digest = %container.digest(),
                    "encrypted"
                );
                Ok(container)
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                warn!(error = %e, "encryption session failed");
                Err(e)
            }
        }
    }

    async fn encrypt<R, W>(
        &mut self,
        mut source: R,
        mut sink: W,
        progress: Option<&ProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> CryptoResult<Container>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.mime.len() > u16::MAX as usize {
            return Err(CryptoError::MalformedContainer(
                "mime longer than 65535 bytes".into(),
            ));
        }
        if let Some(len) = self.size_hint {
            let needed = expected_chunk_count(len, self.chunk_size);
            if needed > self.chunk_limit {
                return Err(CryptoError::ChunkCountExceeded {
                    chunks: needed,
                    max: self.chunk_limit,
                });
            }
        }

        let mut sequencer =
            NonceSequencer::with_limit(crate::nonce::start(self.provider.as_ref())?, self.chunk_limit);
        let chunk_size = self.chunk_size as usize;
        let mut hasher = PlaintextHasher::new();
        let mut lengths: Vec<u32> = Vec::new();
        let mut total = 0u64;

        self.transition(SessionState::Reading);
        let mut current = Vec::new();
        read_chunk(&mut source, &mut current, chunk_size).await?;
        let mut next = Vec::new();

        loop {
            check_cancelled(cancel)?;

            // A full chunk may be followed by more data; a short one never is
            if current.len() == chunk_size {
                read_chunk(&mut source, &mut next, chunk_size).await?;
            } else {
                next.clear();
            }
            let is_final = next.is_empty();

            self.transition(SessionState::Encrypting);
            let (index, nonce) = sequencer.next_nonce()?;
            hasher.update(&current);
            let ciphertext = self
                .codec
                .seal(&nonce, &self.binding.aad(index, is_final), &current)?;

            self.transition(SessionState::Emitting);
            sink.write_all(&ciphertext).await?;

            lengths.push(current.len() as u32);
            total += current.len() as u64;
            if let Some(cb) = progress {
                cb(total, lengths.len() as u64);
            }
            debug!(index, plain = current.len(), is_final, "chunk encrypted");

            if is_final {
                break;
            }
            std::mem::swap(&mut current, &mut next);
            self.transition(SessionState::Reading);
        }

        sink.flush().await?;

        Container::finalize(
            sequencer.base(),
            self.chunk_size,
            lengths,
            total,
            self.mime.clone(),
            hasher.finalize(),
            self.binding,
        )
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "encrypt session");
        self.state = next;
    }
}

/// One decryption pass: ciphertext source → plaintext sink, checked against a container.
pub struct DecryptSession<'c> {
    codec: ChunkCodec,
    container: &'c Container,
    state: SessionState,
}

impl DecryptSession<'_> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion and return the verified plaintext digest.
    ///
    /// Plaintext reaches `sink` chunk by chunk; on any error the caller must
    /// discard it. `AuthenticationFailed` and `IntegrityMismatch` both mean
    /// the input cannot be trusted.
    pub async fn run<R, W>(
        &mut self,
        ciphertext: R,
        sink: W,
        progress: Option<&ProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> CryptoResult<Digest>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.state != SessionState::Idle {
            return Err(CryptoError::SessionFinished);
        }

        match self.decrypt(ciphertext, sink, progress, cancel).await {
            Ok(digest) => {
                self.transition(SessionState::Done);
                info!(
                    chunks = self.container.chunk_count(),
                    bytes = self.container.total_size(),
                    digest = %digest,
                    "decrypted"
                );
                Ok(digest)
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                warn!(error = %e, "decryption session failed");
                Err(e)
            }
        }
    }

    async fn decrypt<R, W>(
        &mut self,
        mut ciphertext: R,
        mut sink: W,
        progress: Option<&ProgressFn>,
        cancel: Option<&CancellationToken>,
    ) -> CryptoResult<Digest>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let container = self.container;
        container.validate()?;

        let binding = container.binding();
        let count = container.chunk_lengths().len();
        let mut hasher = PlaintextHasher::new();
        let mut buf = Vec::new();
        let mut done = 0u64;

        for (i, &len) in container.chunk_lengths().iter().enumerate() {
            check_cancelled(cancel)?;

            self.transition(SessionState::Reading);
            let want = len as usize + TAG_SIZE;
            // Grow only with bytes actually received; the declared length is untrusted
            buf.clear();
            (&mut ciphertext).take(want as u64).read_to_end(&mut buf).await?;
            if buf.len() < want {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("chunk {i}: expected {want} ciphertext bytes, blob ended after {}", buf.len()),
                )
                .into());
            }

            self.transition(SessionState::Decrypting);
            let nonce = derive(container.base_nonce(), i as u64)?;
            let index = i as u32;
            let plaintext = self
                .codec
                .open(&nonce, &binding.aad(index, i + 1 == count), &buf)?;
            hasher.update(&plaintext);

            self.transition(SessionState::Emitting);
            sink.write_all(&plaintext).await?;

            done += plaintext.len() as u64;
            if let Some(cb) = progress {
                cb(done, (i + 1) as u64);
            }
            debug!(index, plain = plaintext.len(), "chunk decrypted");
        }

        let mut probe = [0u8; 1];
        if ciphertext.read(&mut probe).await? != 0 {
            return Err(CryptoError::TrailingCiphertext);
        }
        sink.flush().await?;

        let actual = hasher.finalize();
        if !verify(container.digest(), &actual) {
            return Err(CryptoError::IntegrityMismatch {
                expected: container.digest().to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(actual)
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "decrypt session");
        self.state = next;
    }
}

/// Fill `buf` with up to `limit` bytes, stopping early only at end of input.
async fn read_chunk<R>(source: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    buf.clear();
    source.take(limit as u64).read_to_end(buf).await?;
    Ok(())
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> CryptoResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(CryptoError::Cancelled),
        _ => Ok(()),
    }
}
