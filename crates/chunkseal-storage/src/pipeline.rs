//! Encrypt straight into an upload, and download straight into decryption
//!
//! Neither direction buffers the whole file: the sealing session writes into
//! one end of an in-process pipe while the upload drains the other end.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chunkseal_crypto::{
    Container, CryptoError, Digest, ProgressFn, StreamingEngine, SymmetricKey,
};

use crate::store::{BlobStore, ContentAddress, UploadProgressFn};

/// Pipe capacity between the sealing session and the upload (256KB)
const PIPE_CAPACITY: usize = 256 * 1024;

/// Seal `source` and upload the ciphertext as `name`.
///
/// `progress` observes plaintext consumed by the engine; `on_stored` observes
/// ciphertext bytes accepted by storage. If sealing fails the partially
/// uploaded blob is deleted. Crypto failures stay reachable through
/// `anyhow::Error::downcast_ref::<CryptoError>()`.
#[allow(clippy::too_many_arguments)]
pub async fn seal_and_upload<R>(
    engine: &StreamingEngine,
    key: &SymmetricKey,
    store: &BlobStore,
    name: &str,
    source: R,
    mime: Option<&str>,
    progress: Option<&ProgressFn>,
    on_stored: Option<&UploadProgressFn>,
    cancel: Option<&CancellationToken>,
) -> Result<(Container, ContentAddress)>
where
    R: AsyncRead + Unpin,
{
    let (mut tx, rx) = tokio::io::duplex(PIPE_CAPACITY);

    let mut session = engine.encrypt_session(key);
    if let Some(mime) = mime {
        session = session.with_mime(mime);
    }

    let seal = async {
        let result = session.run(source, &mut tx, progress, cancel).await;
        // EOF for the upload side, on success and on failure
        drop(tx);
        result
    };
    let upload = store.upload(name, rx, on_stored);

    let (sealed, uploaded) = tokio::join!(seal, upload);

    match (sealed, uploaded) {
        (Ok(container), Ok(addr)) => {
            info!(
                path = %addr.path,
                chunks = container.chunk_count(),
                bytes = container.total_size(),
                "sealed and uploaded"
            );
            Ok((container, addr))
        }
        (Err(e), Ok(addr)) => {
            if let Err(del) = store.delete(&addr).await {
                warn!(path = %addr.path, error = %del, "removing partial blob");
            }
            Err(e.into())
        }
        // the pipe broke because the upload went away first
        (Err(CryptoError::Io(_)), Err(upload_err)) => Err(upload_err),
        (Err(e), Err(_)) => Err(e.into()),
        (Ok(_), Err(upload_err)) => Err(upload_err),
    }
}

/// Stream the blob at `addr` through a decrypt session into `sink`.
///
/// Returns the verified plaintext digest. Nothing written to `sink` should
/// be trusted unless this returns `Ok`.
pub async fn download_and_open<W>(
    engine: &StreamingEngine,
    key: &SymmetricKey,
    store: &BlobStore,
    addr: &ContentAddress,
    container: &Container,
    sink: W,
    progress: Option<&ProgressFn>,
    cancel: Option<&CancellationToken>,
) -> Result<Digest>
where
    W: AsyncWrite + Unpin,
{
    if addr.size != container.ciphertext_size() {
        anyhow::bail!(
            "blob {} holds {} bytes but the container describes {}",
            addr.path,
            addr.size,
            container.ciphertext_size()
        );
    }

    let reader = store.open(addr).await?;
    let digest = engine
        .decrypt_session(key, container)
        .run(reader, sink, progress, cancel)
        .await?;

    info!(path = %addr.path, digest = %digest, "downloaded and opened");
    Ok(digest)
}
