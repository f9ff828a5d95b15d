//! Transport abstraction for cmdsync.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying message connection (mock for testing, loopback for demos).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented over JSON text frames:
//! - `connect()` establishes a connection
//! - `send()` transmits one frame
//! - `recv()` receives one frame
//! - `close()` gracefully terminates
//!
//! The client never has more than one request outstanding, and replies are
//! expected in request order.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect("loopback").await?;
//! transport.send(r#"{"topic":"PULL","locationId":null,"cursor":null}"#).await?;
//! let reply = transport.recv().await?;
//! ```

mod loopback;
mod mock;

pub use loopback::{LoopbackTransport, RemoteConfig, RemoteStore, COMMAND_DOC_TYPE};
pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Transport trait for exchanging cmdsync protocol frames.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, in-process loopback, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the endpoint identified by the given address.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one JSON text frame.
    async fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Receive one JSON text frame.
    ///
    /// Fails with [`TransportError::ConnectionClosed`] when nothing more
    /// will arrive.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
