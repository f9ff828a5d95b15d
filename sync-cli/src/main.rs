//! # cmdsync
//!
//! Demo harness for the cmdsync protocol.
//!
//! Each client is a snapshot file in the data directory. The `sync` command
//! drives one client through a PUSH/PULL cycle against the loopback remote,
//! a JSON doc log shared by every client in the same data directory.
//!
//! ## Commands
//!
//! - `add-client`: Register a new client
//! - `list`: List stored clients
//! - `delete`: Remove a client
//! - `command`: Queue a command on a client
//! - `sync`: Run a sync cycle
//! - `inspect`: Show a client's state
//! - `seed`: Add records to the loopback remote
//!
//! ## Example
//!
//! ```bash
//! # Register a client and queue some work
//! cmdsync add-client
//! cmdsync command <id> '{"action":"create","properties":{"name":"a"}}'
//!
//! # Give the remote something to serve, then sync
//! cmdsync seed --count 12 --type item
//! cmdsync sync <id> --batch-size 2
//!
//! cmdsync inspect <id>
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{clients, command, inspect, seed, sync};
use config::{CliConfig, CONFIG_FILE};

/// Demo harness for the cmdsync protocol.
#[derive(Parser, Debug)]
#[command(name = "cmdsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for client snapshots and the loopback remote
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: cmdsync.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a new client with an empty snapshot
    AddClient,

    /// List stored clients
    List,

    /// Delete a client
    Delete {
        /// Client id
        id: String,
    },

    /// Queue a command on a client
    Command {
        /// Client id
        id: String,

        /// Command as JSON: {"action": "...", "properties": {...}}
        json: String,
    },

    /// Run a sync cycle for a client
    Sync {
        /// Client id
        id: String,

        /// Stop after this many steps
        #[arg(long)]
        steps: Option<usize>,

        /// Commands per PUSH (overrides the config file)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Interrupt the client after this many steps
        #[arg(long, conflicts_with = "steps")]
        interrupt_after: Option<usize>,
    },

    /// Show a client's persisted and in-memory state
    Inspect {
        /// Client id
        id: String,
    },

    /// Add records to the loopback remote
    Seed {
        /// Number of records
        #[arg(long, default_value = "10")]
        count: usize,

        /// Record type
        #[arg(long = "type", default_value = "item")]
        doc_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    let config_path = cli.config.unwrap_or_else(|| data_dir.join(CONFIG_FILE));
    let config = CliConfig::load(&config_path)
        .await
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::AddClient => {
            clients::add(&data_dir).await?;
        }
        Commands::List => {
            clients::list(&data_dir).await?;
        }
        Commands::Delete { id } => {
            clients::delete(&data_dir, &id).await?;
        }
        Commands::Command { id, json } => {
            command::run(&data_dir, &config, &id, &json).await?;
        }
        Commands::Sync {
            id,
            steps,
            batch_size,
            interrupt_after,
        } => {
            let options = sync::SyncOptions {
                steps,
                batch_size,
                interrupt_after,
            };
            sync::run(&data_dir, &config, &id, options).await?;
        }
        Commands::Inspect { id } => {
            inspect::run(&data_dir, &id).await?;
        }
        Commands::Seed { count, doc_type } => {
            seed::run(&data_dir, &config, count, &doc_type).await?;
        }
    }

    Ok(())
}

/// Log to stderr so command output on stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "cmdsync=debug" } else { "cmdsync=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Get the default data directory for cmdsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "cmdsync", "cmdsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
