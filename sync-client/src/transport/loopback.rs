//! In-process loopback transport backed by a JSON file.
//!
//! The remote side is a plain document log (`remote.json`). PUSH appends
//! one `command` record per pushed command; PULL pages through the log by
//! offset. Several clients sharing a data directory see each other's
//! commands on their next pull.

use super::{Transport, TransportError};
use crate::persist::StoreError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use cmdsync_types::{
    Command, Cursor, Doc, InboundMessage, LocationId, OutboundMessage, PullMessage, PullReply,
    PushReply, SyncError, CATEGORY_TYPE,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Record type used for pushed commands in the remote log.
pub const COMMAND_DOC_TYPE: &str = "command";

/// Address the loopback transport answers to.
const LOOPBACK_ADDRESS: &str = "loopback";

/// File name of the remote log inside the data directory.
const REMOTE_FILE: &str = "remote.json";

/// Behaviour of the simulated server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Records per PULL page.
    pub page_size: usize,
    /// Partition reported in every PULL reply.
    pub location_id: LocationId,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            page_size: 5,
            location_id: LocationId::new("loc-1"),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteLog {
    docs: Vec<Doc>,
}

/// File-backed document log playing the server.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    path: PathBuf,
    config: RemoteConfig,
}

impl RemoteStore {
    /// Remote log stored at `path`.
    pub fn new(path: impl Into<PathBuf>, config: RemoteConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    /// Remote log stored as `remote.json` in `data_dir`.
    pub fn in_dir(data_dir: &Path, config: RemoteConfig) -> Self {
        Self::new(data_dir.join(REMOTE_FILE), config)
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first. A missing file is an empty log.
    pub async fn docs(&self) -> Result<Vec<Doc>, StoreError> {
        Ok(self.load().await?.docs)
    }

    /// Answer one request the way the server would.
    pub async fn apply(&self, request: OutboundMessage) -> Result<InboundMessage, StoreError> {
        match request {
            OutboundMessage::Push(push) => {
                let processed = self.append_commands(push.commands).await?;
                Ok(InboundMessage::Push(PushReply {
                    processed: Some(processed),
                }))
            }
            OutboundMessage::Pull(pull) => Ok(InboundMessage::Pull(self.page(pull).await?)),
        }
    }

    /// Append `count` generated records of `doc_type`.
    pub async fn seed(&self, count: usize, doc_type: &str) -> Result<Vec<Doc>, StoreError> {
        let mut log = self.load().await?;
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let start = log.docs.len() + 1;

        let seeded: Vec<Doc> = (start..start + count)
            .map(|n| {
                let doc = Doc::new(format!("{}-{}", doc_type, n), doc_type, updated_at.as_str())
                    .with_field("name", json!(format!("{} {}", doc_type, n)));
                if doc_type == CATEGORY_TYPE {
                    doc.with_field("categoryTableId", json!("table-1"))
                } else {
                    doc
                }
            })
            .collect();

        log.docs.extend(seeded.iter().cloned());
        self.save(&log).await?;
        debug!(count, doc_type, "Seeded remote log");
        Ok(seeded)
    }

    async fn append_commands(&self, commands: Vec<Command>) -> Result<Vec<String>, StoreError> {
        let mut log = self.load().await?;
        let mut processed = Vec::with_capacity(commands.len());

        for command in commands {
            processed.push(command.id.clone());
            log.docs.push(
                Doc::new(command.id, COMMAND_DOC_TYPE, command.timestamp)
                    .with_field("action", Value::String(command.action))
                    .with_field("properties", Value::Object(command.properties)),
            );
        }

        self.save(&log).await?;
        debug!(count = processed.len(), "Remote accepted commands");
        Ok(processed)
    }

    async fn page(&self, request: PullMessage) -> Result<PullReply, StoreError> {
        let log = self.load().await?;
        let offset = match &request.cursor {
            None => 0,
            Some(cursor) => cursor.as_str().parse::<usize>().unwrap_or_else(|_| {
                warn!(cursor = %cursor, "Unknown cursor, restarting stream");
                0
            }),
        };

        let records: Vec<Doc> = log
            .docs
            .into_iter()
            .skip(offset)
            .take(self.config.page_size)
            .collect();
        let next_cursor = if records.is_empty() {
            None
        } else {
            Some(Cursor::new((offset + records.len()).to_string()))
        };

        Ok(PullReply {
            location_id: self.config.location_id.clone(),
            records,
            next_cursor,
        })
    }

    async fn load(&self) -> Result<RemoteLog, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RemoteLog::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|e| StoreError::Invalid {
            path: self.path.clone(),
            source: SyncError::InvalidJson(e),
        })
    }

    async fn save(&self, log: &RemoteLog) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(log).map_err(|e| StoreError::Invalid {
            path: self.path.clone(),
            source: SyncError::Serialization(e),
        })?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Transport whose "server" is a [`RemoteStore`].
///
/// Replies are produced synchronously during `send()` and handed out by
/// `recv()` in order.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    remote: RemoteStore,
    inner: Arc<Mutex<LoopbackInner>>,
}

#[derive(Debug, Default)]
struct LoopbackInner {
    connected: bool,
    replies: VecDeque<String>,
}

impl LoopbackTransport {
    /// Transport answering from `remote`.
    pub fn new(remote: RemoteStore) -> Self {
        Self {
            remote,
            inner: Arc::new(Mutex::new(LoopbackInner::default())),
        }
    }

    /// The backing store.
    pub fn remote(&self) -> &RemoteStore {
        &self.remote
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        if address != LOOPBACK_ADDRESS {
            return Err(TransportError::ConnectionFailed(format!(
                "loopback transport cannot reach {:?}",
                address
            )));
        }
        self.lock().connected = true;
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let request =
            OutboundMessage::from_json(frame).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let reply = self
            .remote
            .apply(request)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let reply = reply
            .to_json()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut inner = self.lock();
        // Closed while the remote was answering
        if !inner.connected {
            return Err(TransportError::ConnectionClosed);
        }
        inner.replies.push_back(reply);
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(TransportError::NotConnected);
        }
        inner
            .replies
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.replies.clear();
        Ok(())
    }
}
