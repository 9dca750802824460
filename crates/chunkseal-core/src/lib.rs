pub mod config;
pub mod error;
pub mod logging;

pub use config::{ChunksealConfig, EngineConfig, LogFormat, LoggingConfig, StorageConfig};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;

/// Default maximum plaintext bytes per chunk (1 MiB)
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

/// Content type used when the caller does not supply one
pub const DEFAULT_MIME: &str = "application/octet-stream";
