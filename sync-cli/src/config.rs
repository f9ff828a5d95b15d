//! Configuration management for cmdsync.
//!
//! Configuration is loaded from a TOML file (default: `cmdsync.toml` in the
//! data directory). A missing file means all defaults.

use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use cmdsync_client::{RemoteConfig, SyncConfig};
use cmdsync_core::AckPolicy;
use cmdsync_types::LocationId;

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "cmdsync.toml";

/// Root configuration for cmdsync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CliConfig {
    /// Client configuration.
    #[serde(default)]
    pub client: ClientSection,
    /// Remote configuration.
    #[serde(default)]
    pub remote: RemoteSection,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSection {
    /// Maximum commands per PUSH (default: 10).
    #[serde(default = "default_push_batch_size")]
    pub push_batch_size: usize,
    /// Ack checking, "any" or "strict" (default: any).
    #[serde(default)]
    pub ack_policy: AckPolicy,
}

/// Remote configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteSection {
    /// Address to connect to (default: loopback).
    #[serde(default = "default_address")]
    pub address: String,
    /// Records per PULL page served by the loopback remote (default: 5).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Location id reported by the loopback remote (default: loc-1).
    #[serde(default = "default_location_id")]
    pub location_id: String,
}

// Default value functions
fn default_push_batch_size() -> usize {
    10
}

fn default_address() -> String {
    "loopback".to_string()
}

fn default_page_size() -> usize {
    5
}

fn default_location_id() -> String {
    "loc-1".to_string()
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            push_batch_size: default_push_batch_size(),
            ack_policy: AckPolicy::default(),
        }
    }
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            page_size: default_page_size(),
            location_id: default_location_id(),
        }
    }
}

impl CliConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("client.push_batch_size", self.client.push_batch_size)?;
        positive("remote.page_size", self.remote.page_size)?;
        if self.remote.location_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "remote.location_id",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Client driver configuration; `batch_size` overrides the file.
    pub fn sync_config(&self, batch_size: Option<usize>) -> Result<SyncConfig, ConfigError> {
        let size = positive(
            "push batch size",
            batch_size.unwrap_or(self.client.push_batch_size),
        )?;
        Ok(SyncConfig::new(&self.remote.address)
            .with_push_batch_size(size)
            .with_ack_policy(self.client.ack_policy))
    }

    /// Loopback remote configuration.
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            page_size: self.remote.page_size,
            location_id: LocationId::new(self.remote.location_id.clone()),
        }
    }
}

fn positive(field: &'static str, value: usize) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or(ConfigError::InvalidValue {
        field,
        reason: "must be a positive integer".to_string(),
    })
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use anyhow::Context;
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
