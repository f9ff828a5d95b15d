//! Run a sync cycle for one client against the loopback remote.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use cmdsync_client::{ClientEvent, LoopbackTransport, RemoteStore, SyncClient};
use cmdsync_core::ClientState;

use super::{load_snapshot, parse_client_id, snapshot_store};
use crate::config::CliConfig;

/// Options for one sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Stop after this many steps.
    pub steps: Option<usize>,
    /// Push batch size override.
    pub batch_size: Option<usize>,
    /// Interrupt after this many steps.
    pub interrupt_after: Option<usize>,
}

/// Run the sync command. Returns the client's final state.
pub async fn run(
    data_dir: &Path,
    config: &CliConfig,
    id: &str,
    options: SyncOptions,
) -> Result<ClientState> {
    let client_id = parse_client_id(id)?;
    let sync_config = config
        .sync_config(options.batch_size)
        .context("Invalid sync options")?;

    let store = snapshot_store(data_dir);
    let snapshot = load_snapshot(&store, client_id).await?;
    let remote = RemoteStore::in_dir(data_dir, config.remote_config());
    let client = SyncClient::new(
        client_id,
        sync_config,
        LoopbackTransport::new(remote),
        store,
        snapshot,
    );
    let subscription = client.subscribe(print_event);

    client.connect().await.context("Failed to connect")?;
    let limit = options.interrupt_after.or(options.steps);
    let steps = client.run_until_idle(limit).await.context("Sync failed")?;

    if options.interrupt_after.is_some() {
        client.interrupt().await.context("Interrupt failed")?;
    } else {
        client.disconnect().await.context("Disconnect failed")?;
    }
    client.unsubscribe(subscription);

    let state = client.state().await;
    info!(client = %client_id, steps, pending = state.commands().len(), "Sync finished");

    println!();
    println!("Steps:     {}", steps);
    println!("Pending:   {}", state.commands().len());
    println!("Records:   {}", state.records().len());
    println!(
        "Cursor:    {}",
        state.cursor().map(|c| c.as_str()).unwrap_or("-")
    );
    Ok(state)
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Transition {
            action,
            topic,
            step,
            next_action,
        } => {
            let step = step.map(|s| s.as_str()).unwrap_or("-");
            println!("{:<20} {:<5} {:<20} next: {}", action, topic, step, next_action);
        }
        ClientEvent::RequestSent { topic } => println!("  -> {}", topic),
        ClientEvent::ReplyReady { topic } => println!("  <- {}", topic),
        ClientEvent::FrameDropped { reason } => println!("  dropped: {}", reason),
        ClientEvent::ActionRejected { action, expected } => {
            println!("  rejected {} (expected {})", action, expected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{clients, command, seed};
    use cmdsync_client::SnapshotStore;
    use cmdsync_core::Topic;

    async fn client_with_commands(dir: &Path, config: &CliConfig, n: usize) -> String {
        let id = clients::add(dir).await.unwrap().to_string();
        for i in 0..n {
            let json = format!(r#"{{"action":"create","properties":{{"n":{}}}}}"#, i);
            command::run(dir, config, &id, &json).await.unwrap();
        }
        id
    }

    // ===========================================
    // Full Cycle Tests
    // ===========================================

    #[tokio::test]
    async fn sync_drains_queue_and_pulls_remote() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::default();
        seed::run(dir.path(), &config, 4, "item").await.unwrap();
        let id = client_with_commands(dir.path(), &config, 3).await;

        let options = SyncOptions {
            batch_size: Some(2),
            ..Default::default()
        };
        let state = run(dir.path(), &config, &id, options).await.unwrap();

        assert!(state.commands().is_empty());
        assert!(!state.is_connected());
        assert_eq!(state.topic(), Topic::Idle);
        // 4 seeded + 3 pushed commands
        assert_eq!(state.records().len(), 7);
        assert_eq!(state.cursor().map(|c| c.as_str()), Some("7"));

        let stored = snapshot_store(dir.path())
            .load(parse_client_id(&id).unwrap())
            .await
            .unwrap();
        assert!(stored.commands.is_empty());
        assert_eq!(stored.records.len(), 7);
    }

    #[tokio::test]
    async fn second_client_sees_first_clients_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::default();
        let first = client_with_commands(dir.path(), &config, 2).await;
        let second = clients::add(dir.path()).await.unwrap().to_string();

        run(dir.path(), &config, &first, SyncOptions::default())
            .await
            .unwrap();
        let state = run(dir.path(), &config, &second, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(state.records().len(), 2);
    }

    #[tokio::test]
    async fn resync_resumes_from_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::default();
        seed::run(dir.path(), &config, 3, "item").await.unwrap();
        let id = clients::add(dir.path()).await.unwrap().to_string();

        run(dir.path(), &config, &id, SyncOptions::default())
            .await
            .unwrap();
        seed::run(dir.path(), &config, 2, "item").await.unwrap();
        let state = run(dir.path(), &config, &id, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(state.records().len(), 5);
        assert_eq!(state.cursor().map(|c| c.as_str()), Some("5"));
    }

    // ===========================================
    // Partial Runs
    // ===========================================

    #[tokio::test]
    async fn step_limit_stops_mid_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::default();
        let id = client_with_commands(dir.path(), &config, 1).await;

        let options = SyncOptions {
            steps: Some(1),
            ..Default::default()
        };
        let state = run(dir.path(), &config, &id, options).await.unwrap();

        // Sent but never acknowledged: still queued
        assert_eq!(state.commands().len(), 1);
    }

    #[tokio::test]
    async fn interrupt_keeps_persisted_progress() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::default();
        let id = client_with_commands(dir.path(), &config, 2).await;

        let options = SyncOptions {
            batch_size: Some(1),
            interrupt_after: Some(3),
            ..Default::default()
        };
        let state = run(dir.path(), &config, &id, options).await.unwrap();

        // One full push triple made it to the snapshot
        assert_eq!(state.commands().len(), 1);
        assert_eq!(state.total_commands_sent(), 0);
        assert!(state.last_action().is_none());
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::default();
        let id = client_with_commands(dir.path(), &config, 1).await;

        let options = SyncOptions {
            batch_size: Some(0),
            ..Default::default()
        };
        assert!(run(dir.path(), &config, &id, options).await.is_err());
    }
}
