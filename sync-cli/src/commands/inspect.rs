//! Show a client's state.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use cmdsync_core::ClientState;
use cmdsync_types::PersistedSnapshot;

use super::{load_snapshot, parse_client_id, snapshot_store};

/// Run the inspect command.
///
/// Prints three sections: the persisted snapshot without its commands,
/// the commands one per line, and the in-memory view a freshly loaded
/// client would have.
pub async fn run(data_dir: &Path, id: &str) -> Result<()> {
    let client_id = parse_client_id(id)?;
    let snapshot = load_snapshot(&snapshot_store(data_dir), client_id).await?;

    println!("=== persisted ===");
    println!("{}", serde_json::to_string_pretty(&persisted_view(&snapshot)?)?);
    println!();

    println!("=== commands ({}) ===", snapshot.commands.len());
    for line in command_lines(&snapshot)? {
        println!("{}", line);
    }
    println!();

    let state = ClientState::initialize(snapshot, false);
    println!("=== state ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&state.view()).context("Failed to render state")?
    );

    Ok(())
}

/// The snapshot as JSON, minus the command queue.
fn persisted_view(snapshot: &PersistedSnapshot) -> Result<Value> {
    let mut value = serde_json::to_value(snapshot).context("Failed to render snapshot")?;
    if let Some(object) = value.as_object_mut() {
        object.remove("commands");
    }
    Ok(value)
}

fn command_lines(snapshot: &PersistedSnapshot) -> Result<Vec<String>> {
    snapshot
        .commands
        .iter()
        .map(|c| serde_json::to_string(c).context("Failed to render command"))
        .collect()
}
