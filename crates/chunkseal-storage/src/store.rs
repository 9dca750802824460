//! Blob upload/download over an OpenDAL operator
//!
//! Each upload lands at `{prefix}/{uuid}/{name}`. The returned address also
//! carries the BLAKE3 hash of the bytes the backend accepted, so a blob can
//! be checked against its address later without trusting the backend.

use anyhow::{Context, Result};
use opendal::Operator;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chunkseal_core::config::StorageConfig;

use crate::operator::build_operator;

/// Upload progress observer: total bytes accepted by storage so far
pub type UploadProgressFn = Box<dyn Fn(u64) + Send + Sync>;

/// Read buffer for streaming uploads (64KB)
const UPLOAD_BUFFER: usize = 64 * 1024;

/// Where an uploaded blob lives. Opaque to the crypto engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAddress {
    /// Object path within the operator
    pub path: String,
    /// BLAKE3 of the uploaded bytes (64 hex chars)
    pub blake3: String,
    pub size: u64,
}

#[derive(Clone)]
pub struct BlobStore {
    op: Operator,
    prefix: String,
}

impl BlobStore {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &StorageConfig) -> Result<Self> {
        Ok(Self::new(build_operator(cfg)?, cfg.prefix.clone()))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Stream `reader` into a new object named `name`.
    ///
    /// `on_progress` sees a running total after every buffer the backend
    /// accepts. A failed upload is aborted and never yields an address.
    pub async fn upload<R>(
        &self,
        name: &str,
        mut reader: R,
        on_progress: Option<&UploadProgressFn>,
    ) -> Result<ContentAddress>
    where
        R: AsyncRead + Unpin,
    {
        if name.is_empty() || name.contains('/') {
            anyhow::bail!("invalid blob name {name:?}: must be non-empty and contain no '/'");
        }

        let path = format!("{}/{}/{name}", self.prefix, Uuid::new_v4());
        let mut writer = self
            .op
            .writer(&path)
            .await
            .with_context(|| format!("opening upload: {path}"))?;

        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; UPLOAD_BUFFER];
        let mut accepted = 0u64;

        let streamed: Result<()> = async {
            loop {
                let n = reader.read(&mut buf).await.context("reading upload source")?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                writer
                    .write(buf[..n].to_vec())
                    .await
                    .with_context(|| format!("uploading to {path}"))?;
                accepted += n as u64;
                if let Some(cb) = on_progress {
                    cb(accepted);
                }
            }
            writer
                .close()
                .await
                .with_context(|| format!("finishing upload: {path}"))?;
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            if let Err(abort_err) = writer.abort().await {
                warn!(path = %path, error = %abort_err, "aborting failed upload");
            }
            return Err(e);
        }

        let addr = ContentAddress {
            path,
            blake3: hasher.finalize().to_hex().to_string(),
            size: accepted,
        };
        info!(path = %addr.path, blake3 = %addr.blake3, bytes = addr.size, "uploaded");
        Ok(addr)
    }

    /// Open a stored blob for streaming reads.
    pub async fn open(&self, addr: &ContentAddress) -> Result<impl AsyncRead + Unpin> {
        let reader = self
            .op
            .reader(&addr.path)
            .await
            .with_context(|| format!("opening blob: {}", addr.path))?;
        let stream = reader
            .into_bytes_stream(..)
            .await
            .with_context(|| format!("streaming blob: {}", addr.path))?;
        debug!(path = %addr.path, "blob opened");
        Ok(StreamReader::new(Box::pin(stream)))
    }

    /// Re-hash the stored blob and compare it with its address.
    pub async fn verify(&self, addr: &ContentAddress) -> Result<bool> {
        let mut reader = self.open(addr).await?;
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; UPLOAD_BUFFER];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf).await.context("reading blob for verification")?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok(size == addr.size && hasher.finalize().to_hex().as_str() == addr.blake3)
    }

    pub async fn delete(&self, addr: &ContentAddress) -> Result<()> {
        self.op
            .delete(&addr.path)
            .await
            .with_context(|| format!("deleting blob: {}", addr.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn memory_store() -> BlobStore {
        BlobStore::from_config(&StorageConfig::default()).expect("memory store")
    }

    #[tokio::test]
    async fn upload_reports_progress_and_address() {
        let store = memory_store();
        let data = vec![0x5Au8; 200_000];
        let last = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&last);
        let progress: UploadProgressFn = Box::new(move |n| {
            assert!(n >= seen.load(Ordering::SeqCst), "progress must not go backwards");
            seen.store(n, Ordering::SeqCst);
        });

        let addr = store.upload("blob.bin", &data[..], Some(&progress)).await.unwrap();

        assert_eq!(last.load(Ordering::SeqCst), 200_000);
        assert_eq!(addr.size, 200_000);
        assert_eq!(addr.blake3, blake3::hash(&data).to_hex().to_string());
        assert!(addr.path.starts_with("uploads/"));
        assert!(addr.path.ends_with("/blob.bin"));

        let stored = store.operator().read(&addr.path).await.unwrap();
        assert_eq!(stored.to_vec(), data);
    }

    #[tokio::test]
    async fn same_name_gets_distinct_paths() {
        let store = memory_store();
        let a = store.upload("x", &b"one"[..], None).await.unwrap();
        let b = store.upload("x", &b"two"[..], None).await.unwrap();
        assert_ne!(a.path, b.path);
    }

    #[tokio::test]
    async fn open_streams_back_and_verify_detects_change() {
        let store = memory_store();
        let addr = store.upload("v.bin", &b"verify me"[..], None).await.unwrap();

        let mut back = Vec::new();
        store.open(&addr).await.unwrap().read_to_end(&mut back).await.unwrap();
        assert_eq!(back, b"verify me");
        assert!(store.verify(&addr).await.unwrap());

        store.operator().write(&addr.path, b"verify mE".to_vec()).await.unwrap();
        assert!(!store.verify(&addr).await.unwrap());

        store.delete(&addr).await.unwrap();
        assert!(!store.operator().exists(&addr.path).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let store = memory_store();
        assert!(store.upload("", &b""[..], None).await.is_err());
        assert!(store.upload("../escape", &b""[..], None).await.is_err());
    }
}
