use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_MIME};

/// Top-level configuration (loaded from chunkseal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunksealConfig {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl ChunksealConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: defaults are returned and a warning
    /// is logged. A file that exists but cannot be read or parsed is.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("parsing config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.engine.chunk_size == 0 {
            return Err(CoreError::Config("engine.chunk_size must be at least 1".into()));
        }
        if self.engine.chunk_size > u32::MAX as u64 {
            return Err(CoreError::Config(format!(
                "engine.chunk_size {} exceeds the 32-bit container field",
                self.engine.chunk_size
            )));
        }
        if self.engine.default_mime.len() > u16::MAX as usize {
            return Err(CoreError::Config("engine.default_mime is too long".into()));
        }
        Ok(())
    }
}

/// Streaming engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum plaintext bytes per chunk (default: 1 MiB)
    pub chunk_size: u64,
    /// Bind chunk index and final-chunk flag as AEAD associated data (default: true)
    pub bind_chunk_position: bool,
    /// Content type recorded when the caller gives none
    pub default_mime: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE as u64,
            bind_chunk_position: true,
            default_mime: DEFAULT_MIME.into(),
        }
    }
}

/// Blob storage settings. Without an endpoint the in-memory demo backend is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint; `None` selects the in-memory demo backend
    pub endpoint: Option<String>,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Object key prefix for uploaded blobs
    pub prefix: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".into(),
            bucket: "chunkseal".into(),
            access_key_id: None,
            secret_access_key: None,
            prefix: "uploads".into(),
            enforce_tls: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (default: info); RUST_LOG overrides it
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[engine]
chunk_size = 65536
bind_chunk_position = false
default_mime = "text/plain"

[storage]
endpoint = "https://s3.example.com"
region = "eu-west-1"
bucket = "sealed"
prefix = "blobs"
enforce_tls = true

[logging]
level = "debug"
format = "json"
"#;
        let config: ChunksealConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.chunk_size, 65536);
        assert!(!config.engine.bind_chunk_position);
        assert_eq!(config.engine.default_mime, "text/plain");
        assert_eq!(config.storage.endpoint.as_deref(), Some("https://s3.example.com"));
        assert_eq!(config.storage.prefix, "blobs");
        assert!(config.storage.enforce_tls);
        assert_eq!(config.logging.format, LogFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ChunksealConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.chunk_size, 1024 * 1024);
        assert!(config.engine.bind_chunk_position);
        assert_eq!(config.engine.default_mime, "application/octet-stream");
        assert!(config.storage.endpoint.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config: ChunksealConfig = toml::from_str("[engine]\nchunk_size = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_chunk_size_rejected() {
        let config: ChunksealConfig =
            toml::from_str("[engine]\nchunk_size = 8589934592\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("32-bit"));
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = ChunksealConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.engine.chunk_size, 1024 * 1024);
    }

    #[test]
    fn test_load_invalid_file_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[engine\nchunk_size = ").unwrap();
        let err = ChunksealConfig::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
