//! SyncClient - the async driver for cmdsync.
//!
//! This module provides [`SyncClient`], which owns one client's state and
//! walks it through PUSH/PULL cycles over a [`Transport`].
//!
//! # Architecture
//!
//! SyncClient feeds actions into the pure reducer (from sync-core) and
//! performs the I/O each transition calls for: at most one request, sent
//! after its reply slot is armed, and one queued snapshot write.
//!
//! ```text
//! Application → SyncClient → Transport → Remote
//!                   ↓    ↘
//!              sync-core   SnapshotWriter → SnapshotSink
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cmdsync_client::{MemorySnapshotStore, MockTransport, SyncClient, SyncConfig};
//!
//! let client = SyncClient::new(id, SyncConfig::default(), transport, store, snapshot);
//! client.connect().await?;
//! client.add_command(data).await?;
//! client.run_until_idle(None).await?;
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use cmdsync_core::{
    local_action, reduce, request_for, AckPolicy, Action, AwaitedReply, ClientState, NextAction,
    Step, Topic,
};
use cmdsync_types::{
    ClientId, Command, CommandData, InboundMessage, OutboundMessage, PersistedSnapshot, SyncError,
};

use crate::listeners::{Listeners, SubscriptionId};
use crate::persist::SnapshotSink;
use crate::reply::ReplySlot;
use crate::transport::{Transport, TransportError};
use crate::writer::SnapshotWriter;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding a request failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] SyncError),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A request is outstanding; nothing to do until its reply arrives.
    #[error("waiting for a reply")]
    AwaitingReply,

    /// The action is not the state's next action.
    #[error("{action} is not legal here (next is {expected})")]
    Rejected {
        /// Action that was refused.
        action: &'static str,
        /// The legal next action.
        expected: NextAction,
    },
}

/// Configuration for SyncClient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Address of the remote endpoint.
    pub address: String,
    /// Maximum commands per PUSH.
    pub push_batch_size: NonZeroUsize,
    /// How push acks are checked.
    pub ack_policy: AckPolicy,
}

/// Default push batch size.
pub const DEFAULT_PUSH_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => unreachable!(),
};

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            address: "loopback".to_string(),
            push_batch_size: DEFAULT_PUSH_BATCH_SIZE,
            ack_policy: AckPolicy::Any,
        }
    }
}

impl SyncConfig {
    /// Configuration for `address` with default batching.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Self::default()
        }
    }

    /// Set the push batch size.
    pub fn with_push_batch_size(mut self, size: NonZeroUsize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Set the ack policy.
    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }
}

/// Events published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// An action was applied.
    Transition {
        /// Applied action type.
        action: &'static str,
        /// Topic afterwards.
        topic: Topic,
        /// Step afterwards.
        step: Option<Step>,
        /// Next legal action afterwards.
        next_action: NextAction,
    },
    /// An action was refused as illegal.
    ActionRejected {
        /// Refused action type.
        action: &'static str,
        /// The legal next action.
        expected: NextAction,
    },
    /// A request went out.
    RequestSent {
        /// Request topic.
        topic: &'static str,
    },
    /// The awaited reply arrived and is ready to apply.
    ReplyReady {
        /// Reply topic.
        topic: &'static str,
    },
    /// An inbound frame was dropped.
    FrameDropped {
        /// Why.
        reason: String,
    },
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted into the reply slot.
    Ready,
    /// Keepalive, ignored.
    Keepalive,
    /// Malformed, unexpected or stray; dropped.
    Dropped,
}

struct ClientInner {
    state: ClientState,
    slot: ReplySlot,
}

/// The sync client.
///
/// Single writer: every state change goes through the reducer while the
/// inner lock is held. The lock is never held across a network await.
pub struct SyncClient<T: Transport, S: SnapshotSink> {
    client_id: ClientId,
    config: SyncConfig,
    transport: T,
    sink: Arc<S>,
    writer: SnapshotWriter,
    inner: Arc<Mutex<ClientInner>>,
    listeners: Arc<Listeners<ClientEvent>>,
}

impl<T: Transport, S: SnapshotSink> SyncClient<T, S> {
    /// Create a client from its stored snapshot.
    ///
    /// Spawns the snapshot writer, so this must run within a Tokio runtime.
    pub fn new(
        client_id: ClientId,
        config: SyncConfig,
        transport: T,
        sink: S,
        snapshot: PersistedSnapshot,
    ) -> Self {
        let state = ClientState::initialize(snapshot, transport.is_connected());
        let sink = Arc::new(sink);
        Self {
            client_id,
            config,
            transport,
            writer: SnapshotWriter::spawn(client_id, Arc::clone(&sink)),
            sink,
            inner: Arc::new(Mutex::new(ClientInner {
                state,
                slot: ReplySlot::new(),
            })),
            listeners: Arc::new(Listeners::new()),
        }
    }

    /// This client's id.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a reference to the snapshot sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Copy of the current state.
    pub async fn state(&self) -> ClientState {
        self.inner.lock().await.state.clone()
    }

    /// Durable projection of the current state.
    pub async fn snapshot(&self) -> PersistedSnapshot {
        self.inner.lock().await.state.persisted()
    }

    /// True while a request is outstanding.
    pub async fn is_waiting(&self) -> bool {
        self.inner.lock().await.slot.is_waiting()
    }

    /// Whether the manual "next" trigger would do anything now.
    pub async fn can_step(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state.is_connected() && self.transport.is_connected() && !inner.slot.is_waiting()
    }

    /// Register an event listener.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    /// Remove an event listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Open the transport and restart the cycle at PUSH.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.transport
            .connect(&self.config.address)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        info!(client = %self.client_id, address = %self.config.address, "Connected");
        self.connection_changed(true).await;
        Ok(())
    }

    /// Close the transport and go idle, keeping queue and records.
    ///
    /// Returns once the resulting snapshot has been written.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let closed = self.transport.close().await;
        info!(client = %self.client_id, "Disconnected");
        self.connection_changed(false).await;
        self.flush().await;
        closed.map_err(ClientError::from)
    }

    /// Forced reset: drop in-flight state and reload from the snapshot.
    pub async fn interrupt(&self) -> Result<(), ClientError> {
        let closed = self.transport.close().await;
        {
            let mut inner = self.inner.lock().await;
            inner.slot.cancel();
            self.dispatch(&mut inner, Action::Interrupted)?;
        }
        warn!(client = %self.client_id, "Interrupted, state reloaded from snapshot");
        self.flush().await;
        closed.map_err(ClientError::from)
    }

    /// Wait until every snapshot queued so far has reached the sink.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Queue a local mutation. Returns the stamped command.
    pub async fn add_command(&self, data: CommandData) -> Result<Command, ClientError> {
        let command = data.into_command();
        let mut inner = self.inner.lock().await;
        self.dispatch(
            &mut inner,
            Action::Command {
                command: command.clone(),
            },
        )?;
        debug!(client = %self.client_id, id = %command.id, action = %command.action, "Command queued");
        Ok(command)
    }

    /// Advance exactly one micro-step.
    ///
    /// Applies a ready reply if one is held, otherwise the next local
    /// action. Refused while disconnected or while a reply is outstanding.
    pub async fn step(&self) -> Result<Action, ClientError> {
        let (applied, request) = {
            let mut inner = self.inner.lock().await;
            if !inner.state.is_connected() || !self.transport.is_connected() {
                return Err(ClientError::NotConnected);
            }

            let action = match inner.slot.take() {
                Some(action) => action,
                None if inner.slot.is_waiting() => return Err(ClientError::AwaitingReply),
                None => local_action(&inner.state, self.config.push_batch_size.get())
                    .ok_or(ClientError::AwaitingReply)?,
            };

            let request = self.dispatch(&mut inner, action.clone())?;
            if request.is_some() {
                // Armed before the request leaves
                if let Some(expected) = AwaitedReply::for_state(&inner.state) {
                    inner.slot.arm(expected);
                }
            }
            (action, request)
        };

        if let Some(request) = request {
            self.send_request(request).await?;
        }
        Ok(applied)
    }

    /// Receive one frame from the transport and offer it to the reply slot.
    ///
    /// A closed transport counts as connection loss.
    pub async fn receive(&self) -> Result<Delivery, ClientError> {
        match self.transport.recv().await {
            Ok(frame) => Ok(self.handle_frame(&frame).await),
            Err(e) => {
                warn!(client = %self.client_id, error = %e, "Connection lost while receiving");
                self.connection_lost().await;
                Err(e.into())
            }
        }
    }

    /// Classify one inbound frame and fill the reply slot if it matches.
    pub async fn handle_frame(&self, frame: &str) -> Delivery {
        let message = match InboundMessage::from_json(frame) {
            Ok(message) => message,
            Err(e) => {
                error!(client = %self.client_id, error = %e, "Dropping malformed frame");
                self.listeners.emit(&ClientEvent::FrameDropped {
                    reason: e.to_string(),
                });
                return Delivery::Dropped;
            }
        };

        if matches!(message, InboundMessage::Pong) {
            debug!(client = %self.client_id, "Keepalive");
            return Delivery::Keepalive;
        }

        let topic = message.topic();
        let mut inner = self.inner.lock().await;
        match inner.slot.fire(message, self.config.ack_policy) {
            Ok(()) => {
                debug!(client = %self.client_id, topic, "Reply ready");
                self.listeners.emit(&ClientEvent::ReplyReady { topic });
                Delivery::Ready
            }
            Err(e) => {
                warn!(client = %self.client_id, topic, error = %e, "Dropping reply");
                self.listeners.emit(&ClientEvent::FrameDropped {
                    reason: e.to_string(),
                });
                Delivery::Dropped
            }
        }
    }

    /// Automatic mode: run local steps immediately and wait only for
    /// replies, until the cycle comes to rest at IDLE.
    ///
    /// Starting at IDLE still runs one full cycle. `max_steps` caps the
    /// steps taken, so `Some(0)` returns without stepping. Returns the
    /// number of steps taken.
    pub async fn run_until_idle(&self, max_steps: Option<usize>) -> Result<usize, ClientError> {
        let mut steps = 0;
        loop {
            if max_steps.is_some_and(|max| steps >= max) {
                break;
            }

            let (idle, waiting) = {
                let inner = self.inner.lock().await;
                (inner.state.topic() == Topic::Idle, inner.slot.is_waiting())
            };
            if idle && steps > 0 {
                break;
            }
            if waiting {
                match self.receive().await? {
                    Delivery::Ready => {}
                    Delivery::Keepalive | Delivery::Dropped => continue,
                }
            }

            self.step().await?;
            steps += 1;
        }

        info!(client = %self.client_id, steps, "Sync run finished");
        Ok(steps)
    }

    async fn connection_changed(&self, connected: bool) {
        let mut inner = self.inner.lock().await;
        // Unchanged flag: the cycle and its slot stay as they are
        if inner.state.is_connected() == connected {
            debug!(client = %self.client_id, connected, "Connection flag unchanged");
            return;
        }
        if !inner.slot.is_idle() {
            debug!(client = %self.client_id, "Discarding pending reply slot");
        }
        inner.slot.cancel();
        if let Err(e) = self.dispatch(&mut inner, Action::ConnectionChanged { connected }) {
            warn!(client = %self.client_id, connected, error = %e, "Connection change not applied");
        }
    }

    async fn connection_lost(&self) {
        if let Err(e) = self.transport.close().await {
            debug!(client = %self.client_id, error = %e, "Close after connection loss failed");
        }
        self.connection_changed(false).await;
    }

    async fn send_request(&self, request: OutboundMessage) -> Result<(), ClientError> {
        let topic = request.topic();
        let frame = request.to_json()?;

        if let Err(e) = self.transport.send(&frame).await {
            warn!(client = %self.client_id, topic, error = %e, "Send failed");
            self.connection_lost().await;
            return Err(e.into());
        }

        info!(client = %self.client_id, topic, "Request sent");
        self.listeners.emit(&ClientEvent::RequestSent { topic });
        Ok(())
    }

    /// Apply one action, queue its snapshot, publish. Returns the request
    /// the transition calls for.
    fn dispatch(
        &self,
        inner: &mut ClientInner,
        action: Action,
    ) -> Result<Option<OutboundMessage>, ClientError> {
        let name = action.name();
        if !inner.state.accepts(&action) {
            let expected = inner.state.next_action();
            warn!(client = %self.client_id, action = name, expected = %expected, "Rejected illegal action");
            self.listeners
                .emit(&ClientEvent::ActionRejected { action: name, expected });
            return Err(ClientError::Rejected {
                action: name,
                expected,
            });
        }

        let next = reduce(inner.state.clone(), action);
        let request = request_for(&inner.state, &next);
        inner.state = next;

        let state = &inner.state;
        debug!(
            client = %self.client_id,
            action = name,
            topic = %state.topic(),
            step = state.step().map(|s| s.as_str()).unwrap_or("-"),
            next = %state.next_action(),
            "Transition"
        );

        self.writer.write(state.persisted());
        self.listeners.emit(&ClientEvent::Transition {
            action: name,
            topic: state.topic(),
            step: state.step(),
            next_action: state.next_action(),
        });

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemorySnapshotStore;
    use crate::transport::{LoopbackTransport, MockTransport, RemoteConfig, RemoteStore};
    use cmdsync_core::Phase;
    use cmdsync_types::{Cursor, LocationId};
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    type TestClient = SyncClient<MockTransport, MemorySnapshotStore>;

    fn client_with(commands: usize, batch: usize) -> (TestClient, MockTransport, MemorySnapshotStore) {
        let transport = MockTransport::new();
        let store = MemorySnapshotStore::new();
        let snapshot = PersistedSnapshot {
            commands: (1..=commands)
                .map(|i| command(&format!("c{}", i)))
                .collect(),
            ..Default::default()
        };
        let config = SyncConfig::default()
            .with_push_batch_size(NonZeroUsize::new(batch).unwrap());
        let client = SyncClient::new(
            ClientId::new(),
            config,
            transport.clone(),
            store.clone(),
            snapshot,
        );
        (client, transport, store)
    }

    fn command(id: &str) -> Command {
        Command {
            id: id.into(),
            action: "create".into(),
            properties: serde_json::Map::new(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    fn ack() -> String {
        json!({"topic": "PUSH"}).to_string()
    }

    fn page(ids: &[&str], next_cursor: Option<&str>) -> String {
        let records: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "type": "item", "updatedAt": "2024-01-01T00:00:00.000Z"}))
            .collect();
        json!({
            "topic": "PULL",
            "locationId": "loc-1",
            "records": records,
            "nextCursor": next_cursor,
        })
        .to_string()
    }

    fn sent_json(transport: &MockTransport) -> Vec<Value> {
        transport
            .sent_frames()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    // ===========================================
    // Connection Tests
    // ===========================================

    #[tokio::test]
    async fn connect_restarts_at_push() {
        let (client, transport, store) = client_with(1, 10);
        assert!(!client.state().await.is_connected());

        client.connect().await.unwrap();

        let state = client.state().await;
        assert!(state.is_connected());
        assert_eq!(state.phase(), &Phase::FetchingCommands { batch_number: 0 });
        assert_eq!(transport.connected_address(), Some("loopback".to_string()));
        client.flush().await;
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn connect_failure_leaves_state_disconnected() {
        let (client, transport, _) = client_with(0, 10);
        transport.fail_next_connect("refused");

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionFailed(_)));
        assert!(!client.state().await.is_connected());
    }

    #[tokio::test]
    async fn step_refused_while_disconnected() {
        let (client, _, _) = client_with(1, 10);
        assert!(matches!(
            client.step().await,
            Err(ClientError::NotConnected)
        ));
        assert!(!client.can_step().await);
    }

    // ===========================================
    // Manual Stepping
    // ===========================================

    #[tokio::test]
    async fn scenario_a_push_over_mock_transport() {
        let (client, transport, _) = client_with(3, 2);
        client.connect().await.unwrap();

        // batch 1
        assert_eq!(
            client.step().await.unwrap(),
            Action::SentCommandBatch { limit: 2 }
        );
        let sent = sent_json(&transport);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["topic"], "PUSH");
        assert_eq!(sent[0]["commands"].as_array().unwrap().len(), 2);

        // Nothing to do until the ack arrives
        assert!(matches!(
            client.step().await,
            Err(ClientError::AwaitingReply)
        ));
        transport.queue_response(ack());
        assert_eq!(client.receive().await.unwrap(), Delivery::Ready);
        assert_eq!(client.step().await.unwrap(), Action::CommandsAcked);
        assert_eq!(client.step().await.unwrap(), Action::DeletedCommands);
        assert_eq!(client.state().await.commands().len(), 1);

        // batch 2
        client.step().await.unwrap();
        transport.queue_response(ack());
        client.receive().await.unwrap();
        client.step().await.unwrap();
        client.step().await.unwrap();

        let state = client.state().await;
        assert!(state.commands().is_empty());
        assert_eq!(state.total_commands_sent(), 3);
        assert_eq!(state.next_action(), NextAction::SentPull);
        assert_eq!(transport.sent_frames().len(), 2);
    }

    #[tokio::test]
    async fn scenario_b_pull_over_mock_transport() {
        let (client, transport, _) = client_with(0, 10);
        client.connect().await.unwrap();
        transport.queue_response(page(&["d1", "d2", "d3", "d4", "d5"], Some("c1")));
        transport.queue_response(page(&[], None));

        let steps = client.run_until_idle(None).await.unwrap();

        assert_eq!(steps, 6);
        let sent = sent_json(&transport);
        assert_eq!(
            sent[0],
            json!({"topic": "PULL", "locationId": null, "cursor": null})
        );
        assert_eq!(
            sent[1],
            json!({"topic": "PULL", "locationId": "loc-1", "cursor": "c1"})
        );

        let state = client.state().await;
        assert_eq!(state.topic(), Topic::Idle);
        assert_eq!(state.records().len(), 5);
        assert_eq!(state.cursor(), Some(&Cursor::new("c1")));
        assert_eq!(state.active_location_id(), Some(&LocationId::new("loc-1")));
    }

    #[tokio::test]
    async fn scenario_c_disconnect_mid_flight() {
        let (client, transport, _) = client_with(1, 10);
        client.connect().await.unwrap();
        client.step().await.unwrap();
        assert!(client.is_waiting().await);

        client.disconnect().await.unwrap();
        let state = client.state().await;
        assert_eq!(state.topic(), Topic::Idle);
        assert_eq!(state.commands().len(), 1);
        assert!(!client.is_waiting().await);

        client.connect().await.unwrap();
        // Reply to the abandoned request arrives late
        assert_eq!(client.handle_frame(&ack()).await, Delivery::Dropped);

        let state = client.state().await;
        assert_eq!(state.phase(), &Phase::FetchingCommands { batch_number: 0 });
        assert_eq!(state.next_action(), NextAction::SentCommandBatch);
        assert_eq!(state.commands().len(), 1);
        assert_eq!(transport.sent_frames().len(), 1);
    }

    // ===========================================
    // Inbound Frame Handling
    // ===========================================

    #[tokio::test]
    async fn stray_reply_is_dropped() {
        let (client, _, _) = client_with(0, 10);
        client.connect().await.unwrap();
        let before = client.state().await;

        assert_eq!(client.handle_frame(&ack()).await, Delivery::Dropped);
        assert_eq!(client.state().await, before);
    }

    #[tokio::test]
    async fn keepalive_and_garbage_are_ignored() {
        let (client, _, _) = client_with(1, 10);
        client.connect().await.unwrap();
        client.step().await.unwrap();

        assert_eq!(
            client.handle_frame(r#"{"topic":"PONG"}"#).await,
            Delivery::Keepalive
        );
        assert_eq!(client.handle_frame("{oops").await, Delivery::Dropped);
        assert_eq!(client.handle_frame("[]").await, Delivery::Dropped);
        assert_eq!(
            client.handle_frame(r#"{"topic":"NOPE"}"#).await,
            Delivery::Dropped
        );
        assert!(client.is_waiting().await);

        assert_eq!(client.handle_frame(&ack()).await, Delivery::Ready);
    }

    #[tokio::test]
    async fn duplicate_reply_is_not_applied_twice() {
        let (client, _, _) = client_with(1, 10);
        client.connect().await.unwrap();
        client.step().await.unwrap();

        assert_eq!(client.handle_frame(&ack()).await, Delivery::Ready);
        assert_eq!(client.handle_frame(&ack()).await, Delivery::Dropped);
        client.step().await.unwrap();
        assert_eq!(client.handle_frame(&ack()).await, Delivery::Dropped);

        assert_eq!(client.state().await.step(), Some(Step::DeletingCommands));
    }

    #[tokio::test]
    async fn strict_policy_rejects_mismatched_ack() {
        let transport = MockTransport::new();
        let config = SyncConfig::default().with_ack_policy(AckPolicy::Strict);
        let snapshot = PersistedSnapshot {
            commands: vec![command("c1")],
            ..Default::default()
        };
        let client = SyncClient::new(
            ClientId::new(),
            config,
            transport.clone(),
            MemorySnapshotStore::new(),
            snapshot,
        );
        client.connect().await.unwrap();
        client.step().await.unwrap();

        let wrong = json!({"topic": "PUSH", "processed": ["other"]}).to_string();
        assert_eq!(client.handle_frame(&wrong).await, Delivery::Dropped);
        assert!(client.is_waiting().await);

        let right = json!({"topic": "PUSH", "processed": ["c1"]}).to_string();
        assert_eq!(client.handle_frame(&right).await, Delivery::Ready);
    }

    #[tokio::test]
    async fn receive_on_closed_transport_goes_idle() {
        let (client, transport, _) = client_with(1, 10);
        client.connect().await.unwrap();
        client.step().await.unwrap();

        transport.drop_connection();
        assert!(client.receive().await.is_err());

        let state = client.state().await;
        assert!(!state.is_connected());
        assert_eq!(state.topic(), Topic::Idle);
        assert!(!client.is_waiting().await);
    }

    #[tokio::test]
    async fn send_failure_counts_as_connection_loss() {
        let (client, transport, _) = client_with(1, 10);
        client.connect().await.unwrap();
        transport.fail_next_send("broken pipe");

        assert!(matches!(
            client.step().await,
            Err(ClientError::Transport(TransportError::SendFailed(_)))
        ));
        let state = client.state().await;
        assert!(!state.is_connected());
        assert_eq!(state.commands().len(), 1);
    }

    // ===========================================
    // Control Operations
    // ===========================================

    #[tokio::test]
    async fn interrupt_resets_counters_and_disconnects() {
        let (client, transport, _) = client_with(2, 1);
        client.connect().await.unwrap();
        client.step().await.unwrap();
        transport.queue_response(ack());
        client.receive().await.unwrap();
        client.step().await.unwrap();
        client.step().await.unwrap();
        assert_eq!(client.state().await.total_commands_sent(), 1);

        client.interrupt().await.unwrap();

        let state = client.state().await;
        assert!(!state.is_connected());
        assert!(!transport.is_connected());
        assert_eq!(state.total_commands_sent(), 0);
        assert_eq!(state.commands().len(), 1);
        assert!(state.last_action().is_none());
    }

    #[tokio::test]
    async fn add_command_while_idle_arms_push() {
        let (client, transport, store) = client_with(0, 10);
        client.connect().await.unwrap();
        transport.queue_response(page(&[], None));
        client.run_until_idle(None).await.unwrap();
        assert_eq!(client.state().await.topic(), Topic::Idle);

        let data = CommandData::new("rename", serde_json::Map::new());
        let queued = client.add_command(data).await.unwrap();
        client.flush().await;

        let state = client.state().await;
        assert_eq!(state.next_action(), NextAction::SentCommandBatch);
        assert_eq!(store.get(client.client_id()).unwrap().commands, vec![queued]);
    }

    #[tokio::test]
    async fn every_transition_is_persisted() {
        let (client, transport, store) = client_with(1, 10);
        client.connect().await.unwrap();
        transport.queue_response(ack());
        transport.queue_response(page(&[], None));

        let steps = client.run_until_idle(None).await.unwrap();
        client.flush().await;

        // connect + every step
        assert_eq!(store.writes(), 1 + steps);
        assert_eq!(store.get(client.client_id()), Some(client.snapshot().await));
    }

    #[tokio::test]
    async fn listeners_see_transitions_and_requests() {
        let (client, transport, _) = client_with(1, 10);
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let id = client.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        client.connect().await.unwrap();
        client.step().await.unwrap();
        transport.queue_response(ack());
        client.receive().await.unwrap();
        client.unsubscribe(id);
        client.step().await.unwrap();

        let events = events.lock().unwrap();
        assert!(events.contains(&ClientEvent::RequestSent { topic: "PUSH" }));
        assert!(events.contains(&ClientEvent::ReplyReady { topic: "PUSH" }));
        let transitions = events
            .iter()
            .filter(|e| matches!(e, ClientEvent::Transition { .. }))
            .count();
        // connectionChanged + sentCommandBatch; commandsAcked came after unsubscribe
        assert_eq!(transitions, 2);
    }

    #[tokio::test]
    async fn zero_max_steps_takes_no_step() {
        let (client, transport, _) = client_with(1, 10);
        client.connect().await.unwrap();
        let before = client.state().await;

        assert_eq!(client.run_until_idle(Some(0)).await.unwrap(), 0);
        assert_eq!(client.state().await, before);
        assert!(transport.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn max_steps_bounds_a_run() {
        let (client, transport, _) = client_with(0, 10);
        client.connect().await.unwrap();
        transport.queue_response(page(&["d1"], Some("c1")));

        assert_eq!(client.run_until_idle(Some(2)).await.unwrap(), 2);
        assert_eq!(client.state().await.step(), Some(Step::UpsertingBatch));
    }

    // ===========================================
    // Snapshot Writes
    // ===========================================

    /// A sink whose writes never complete.
    struct StalledSink;

    #[async_trait::async_trait]
    impl SnapshotSink for StalledSink {
        async fn on_snapshot_changed(&self, _: ClientId, _: &PersistedSnapshot) {
            std::future::pending::<()>().await
        }
    }

    #[tokio::test]
    async fn stalled_sink_does_not_block_transitions() {
        let transport = MockTransport::new();
        let snapshot = PersistedSnapshot {
            commands: vec![command("c1")],
            ..Default::default()
        };
        let client = SyncClient::new(
            ClientId::new(),
            SyncConfig::default(),
            transport.clone(),
            StalledSink,
            snapshot,
        );

        let run = async {
            client.connect().await.unwrap();
            client.step().await.unwrap();
            transport.queue_response(ack());
            client.receive().await.unwrap();
            client.step().await.unwrap();
            client
                .add_command(CommandData::new("rename", serde_json::Map::new()))
                .await
                .unwrap();
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), run)
            .await
            .expect("transitions waited on the sink");

        assert_eq!(client.state().await.step(), Some(Step::DeletingCommands));
        assert_eq!(transport.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_waits_for_queued_snapshots() {
        let (client, transport, store) = client_with(1, 10);
        client.connect().await.unwrap();
        client.step().await.unwrap();
        transport.queue_response(ack());
        client.receive().await.unwrap();
        client.step().await.unwrap();

        client.disconnect().await.unwrap();

        assert_eq!(store.writes(), 4);
        assert_eq!(store.get(client.client_id()), Some(client.snapshot().await));
    }

    #[tokio::test]
    async fn unchanged_connection_flag_keeps_cycle_and_slot() {
        let (client, _, store) = client_with(1, 10);
        client.connect().await.unwrap();
        client.step().await.unwrap();
        let before = client.state().await;

        client.connect().await.unwrap();
        client.flush().await;

        assert_eq!(client.state().await, before);
        assert_eq!(store.writes(), 2);
        assert!(client.is_waiting().await);
        assert_eq!(client.handle_frame(&ack()).await, Delivery::Ready);
    }

    // ===========================================
    // Loopback End To End
    // ===========================================

    #[tokio::test]
    async fn full_cycle_against_loopback_remote() {
        let dir = tempfile::TempDir::new().unwrap();
        let remote = RemoteStore::in_dir(
            dir.path(),
            RemoteConfig {
                page_size: 5,
                location_id: LocationId::new("loc-1"),
            },
        );
        remote.seed(7, "item").await.unwrap();

        let snapshot = PersistedSnapshot {
            commands: vec![command("c1"), command("c2"), command("c3")],
            ..Default::default()
        };
        let config = SyncConfig::default().with_push_batch_size(NonZeroUsize::new(2).unwrap());
        let client = SyncClient::new(
            ClientId::new(),
            config,
            LoopbackTransport::new(remote.clone()),
            MemorySnapshotStore::new(),
            snapshot,
        );
        client.connect().await.unwrap();

        let steps = client.run_until_idle(None).await.unwrap();

        // 2 push triples + 3 pull triples
        assert_eq!(steps, 15);
        let state = client.state().await;
        assert!(state.commands().is_empty());
        assert_eq!(state.records().len(), 10);
        assert_eq!(state.cursor(), Some(&Cursor::new("10")));
        assert_eq!(state.total_docs_received(), 10);
        assert_eq!(remote.docs().await.unwrap().len(), 10);
    }
}
