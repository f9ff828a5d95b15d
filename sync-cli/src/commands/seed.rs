//! Add records to the loopback remote.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use cmdsync_client::RemoteStore;

use crate::config::CliConfig;

/// Run the seed command. Returns the remote's new record count.
pub async fn run(data_dir: &Path, config: &CliConfig, count: usize, doc_type: &str) -> Result<usize> {
    if doc_type.is_empty() {
        anyhow::bail!("Record type must not be empty");
    }

    let remote = RemoteStore::in_dir(data_dir, config.remote_config());
    let added = remote
        .seed(count, doc_type)
        .await
        .context("Failed to seed remote")?;
    let total = remote.docs().await.context("Failed to read remote")?.len();

    info!(count = added.len(), doc_type, total, "Seeded remote");
    println!("Seeded {} {} records ({} total)", added.len(), doc_type, total);
    Ok(total)
}
