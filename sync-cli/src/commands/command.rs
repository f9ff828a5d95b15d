//! Queue a command on a stored client.

use anyhow::{Context, Result};
use std::path::Path;

use cmdsync_client::{LoopbackTransport, RemoteStore, SyncClient};
use cmdsync_types::{Command, CommandData};

use super::{load_snapshot, parse_client_id, snapshot_store};
use crate::config::CliConfig;

/// Run the command command.
///
/// The command goes through an offline client so it is stamped and
/// persisted exactly like one queued during a session.
pub async fn run(data_dir: &Path, config: &CliConfig, id: &str, json: &str) -> Result<Command> {
    let client_id = parse_client_id(id)?;
    let data = CommandData::from_json(json).context("Invalid command")?;

    let store = snapshot_store(data_dir);
    let snapshot = load_snapshot(&store, client_id).await?;
    let remote = RemoteStore::in_dir(data_dir, config.remote_config());
    let client = SyncClient::new(
        client_id,
        config.sync_config(None)?,
        LoopbackTransport::new(remote),
        store,
        snapshot,
    );

    let command = client.add_command(data).await?;
    client.flush().await;
    println!("Queued {} ({})", command.id, command.action);
    println!("  Pending: {}", client.state().await.commands().len());
    Ok(command)
}
