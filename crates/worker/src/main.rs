//! shellsync worker entry point.
//!
//! Reads host events as JSON lines on stdin and writes replies and client
//! commands to stdout. Logging goes to stderr to keep stdout protocol-only.

use std::sync::Arc;

use anyhow::Result;
use shellsync_core::AppConfig;
use shellsync_worker::{Worker, stdio};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let (host, outbound) = stdio::channel();
    let worker = Worker::from_config(&config, Arc::new(host.clone())).await?;

    tracing::info!(
        cache = %config.cache_name(),
        db = %config.db_path.display(),
        origin = %config.origin,
        "Starting shellsync worker on stdio"
    );

    stdio::serve(worker, host, outbound, tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!("shellsync worker stopped");
    Ok(())
}
