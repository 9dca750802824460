//! OpenDAL Operator factory for blob storage backends

use anyhow::{Context, Result};
use opendal::Operator;

use chunkseal_core::config::StorageConfig;

/// Build an operator from config.
///
/// Without an endpoint this returns an in-memory operator: uploads work and
/// return real addresses, but nothing outlives the process.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    let Some(endpoint) = cfg.endpoint.as_deref() else {
        tracing::warn!("no storage endpoint configured; using in-memory demo backend");
        return memory_operator();
    };

    if endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "storage endpoint uses plaintext HTTP ({endpoint}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development."
            );
        }
        tracing::warn!(
            endpoint = %endpoint,
            "storage endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    let access_key_id = cfg
        .access_key_id
        .as_deref()
        .context("storage.access_key_id is required with an endpoint")?;
    let secret_access_key = cfg
        .secret_access_key
        .as_deref()
        .context("storage.secret_access_key is required with an endpoint")?;

    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

fn memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating in-memory operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish())
}
