//! chunkseal-storage: where sealed blobs go
//!
//! # Overview
//! - `operator`: OpenDAL operator factory (S3-compatible, or in-memory demo)
//! - `store`: `BlobStore::upload(name, bytes, on_progress) -> ContentAddress`
//! - `pipeline`: encrypt straight into an upload, and download straight into decryption
//!
//! The crypto engine never interprets a `ContentAddress`; it only hands
//! ciphertext to this crate and gets it back.

pub mod operator;
pub mod pipeline;
pub mod store;

pub use operator::build_operator;
pub use pipeline::{download_and_open, seal_and_upload};
pub use store::{BlobStore, ContentAddress, UploadProgressFn};
