//! Whole-file helpers over the streaming engine
//!
//! Both directions write into a temporary file next to the destination and
//! persist it only once the session has finished, so a failed or cancelled
//! session never leaves a partial blob or partial plaintext at `dst`.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::container::Container;
use crate::digest::Digest;
use crate::error::CryptoResult;
use crate::keys::SymmetricKey;
use crate::stream::{ProgressFn, StreamingEngine};

/// Encrypt `src` into a ciphertext blob at `dst`.
pub async fn encrypt_file(
    engine: &StreamingEngine,
    key: &SymmetricKey,
    src: &Path,
    dst: &Path,
    mime: Option<&str>,
    progress: Option<&ProgressFn>,
    cancel: Option<&CancellationToken>,
) -> CryptoResult<Container> {
    let file = tokio::fs::File::open(src).await?;
    let len = file.metadata().await?.len();

    let mut session = engine.encrypt_session(key).with_size_hint(len);
    if let Some(mime) = mime {
        session = session.with_mime(mime);
    }

    let (tmp, out) = temp_beside(dst).await?;
    let mut writer = BufWriter::new(out);
    let container = session
        .run(BufReader::new(file), &mut writer, progress, cancel)
        .await?;
    finish(tmp, writer, dst).await?;

    debug!(src = %src.display(), dst = %dst.display(), "blob written");
    Ok(container)
}

/// Decrypt the blob at `src` into `dst`, verifying every tag and the digest.
///
/// `dst` is only created when decryption fully succeeds.
pub async fn decrypt_file(
    engine: &StreamingEngine,
    key: &SymmetricKey,
    container: &Container,
    src: &Path,
    dst: &Path,
    progress: Option<&ProgressFn>,
    cancel: Option<&CancellationToken>,
) -> CryptoResult<Digest> {
    let file = tokio::fs::File::open(src).await?;

    let (tmp, out) = temp_beside(dst).await?;
    let mut writer = BufWriter::new(out);
    let digest = engine
        .decrypt_session(key, container)
        .run(BufReader::new(file), &mut writer, progress, cancel)
        .await?;
    finish(tmp, writer, dst).await?;

    debug!(src = %src.display(), dst = %dst.display(), "plaintext written");
    Ok(digest)
}

/// Temp file in `dst`'s directory (same filesystem, so persist is a rename).
async fn temp_beside(dst: &Path) -> CryptoResult<(NamedTempFile, tokio::fs::File)> {
    let parent = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;
    let (tmp, handle) = blocking(move || {
        let tmp = NamedTempFile::new_in(&parent)?;
        let handle = tmp.as_file().try_clone()?;
        Ok((tmp, handle))
    })
    .await?;
    Ok((tmp, tokio::fs::File::from_std(handle)))
}

async fn finish(
    tmp: NamedTempFile,
    mut writer: BufWriter<tokio::fs::File>,
    dst: &Path,
) -> CryptoResult<()> {
    writer.flush().await?;
    writer.get_mut().sync_all().await?;
    drop(writer);
    let dst = dst.to_path_buf();
    blocking(move || tmp.persist(&dst).map(drop).map_err(|e| e.error)).await?;
    Ok(())
}

/// Run a blocking filesystem call off the async worker threads.
async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(std::io::Error::other)?
}
