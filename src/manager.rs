//! The coordination layer: registers CRDTs, routes local operations to the
//! transport, dispatches inbound envelopes, and fans applied changes out
//! over broadcast event streams.
//!
//! The registry is a `parking_lot::RwLock<HashMap<String, AnyCrdt>>` owned
//! by the manager; `perform_operation`, `sync_with` and `force_sync` are
//! the only `.await` points besides the inbound-dispatch task.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock as SyncRwLock;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use crate::crdt::any::AnyCrdt;
use crate::env;
use crate::envelope::{Envelope, InboundEnvelope};
use crate::error::{CrdtError, CrdtResult};
use crate::events::{EventSource, OperationEvent, SyncEvent, SyncKind, UpdateEvent};
use crate::op::Operation;
use crate::store::StateStore;
use crate::transport::GossipTransport;

/// Manager construction parameters, mirroring how `calimero-node`'s
/// `NodeConfig` is built: a plain struct with `Default` where sensible.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// This replica's id; stamped onto every locally-originated operation.
    pub node_id: String,
    /// Capacity of the `onUpdate` broadcast channel.
    pub update_capacity: usize,
    /// Capacity of the `onOperation` broadcast channel.
    pub operation_capacity: usize,
    /// Capacity of the `onSync` broadcast channel.
    pub sync_capacity: usize,
}

impl ManagerConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            update_capacity: 256,
            operation_capacity: 256,
            sync_capacity: 64,
        }
    }
}

/// Lifecycle states: `Unstarted` → `Initialised` → `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ManagerState {
    Unstarted,
    Initialised,
    Closed,
}

/// Registration, local-op fan-out, inbound dispatch, and the three event
/// streams. Built with [`Manager::new`], then [`Manager::start`]ed before
/// any other call succeeds.
pub struct Manager {
    config: ManagerConfig,
    state: SyncRwLock<ManagerState>,
    registry: SyncRwLock<HashMap<String, AnyCrdt>>,
    store: Arc<dyn StateStore>,
    transport: Arc<dyn GossipTransport>,
    update_tx: broadcast::Sender<UpdateEvent>,
    operation_tx: broadcast::Sender<OperationEvent>,
    sync_tx: broadcast::Sender<SyncEvent>,
    inbound_task: SyncRwLock<Option<JoinHandle<()>>>,
}

impl Manager {
    /// Construct an unstarted manager. Call [`start`](Self::start) before
    /// using any other method.
    pub fn new(
        config: ManagerConfig,
        transport: Arc<dyn GossipTransport>,
        store: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        let (update_tx, _) = broadcast::channel(config.update_capacity.max(1));
        let (operation_tx, _) = broadcast::channel(config.operation_capacity.max(1));
        let (sync_tx, _) = broadcast::channel(config.sync_capacity.max(1));
        Arc::new(Self {
            config,
            state: SyncRwLock::new(ManagerState::Unstarted),
            registry: SyncRwLock::new(HashMap::new()),
            store,
            transport,
            update_tx,
            operation_tx,
            sync_tx,
            inbound_task: SyncRwLock::new(None),
        })
    }

    /// Subscribe to `onUpdate`. Late subscribers don't see prior events.
    pub fn on_update(&self) -> broadcast::Receiver<UpdateEvent> {
        self.update_tx.subscribe()
    }

    /// Subscribe to `onOperation`.
    pub fn on_operation(&self) -> broadcast::Receiver<OperationEvent> {
        self.operation_tx.subscribe()
    }

    /// Subscribe to `onSync`.
    pub fn on_sync(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync_tx.subscribe()
    }

    /// `onUpdate` as a `Stream`, for callers that prefer `.next()` over
    /// matching on `RecvError::Lagged` themselves — grounded on the
    /// teacher's `ReceiverStream` usage at its own websocket/event
    /// boundaries (e.g. `api/src/ws.rs`).
    pub fn update_stream(&self) -> impl tokio_stream::Stream<Item = UpdateEvent> {
        tokio_stream::wrappers::BroadcastStream::new(self.on_update()).filter_map(Result::ok)
    }

    /// `onOperation` as a `Stream`; see [`update_stream`](Self::update_stream).
    pub fn operation_stream(&self) -> impl tokio_stream::Stream<Item = OperationEvent> {
        tokio_stream::wrappers::BroadcastStream::new(self.on_operation()).filter_map(Result::ok)
    }

    /// `onSync` as a `Stream`; see [`update_stream`](Self::update_stream).
    pub fn sync_stream(&self) -> impl tokio_stream::Stream<Item = SyncEvent> {
        tokio_stream::wrappers::BroadcastStream::new(self.on_sync()).filter_map(Result::ok)
    }

    /// Begin accepting work: subscribes to the transport and spawns the
    /// inbound-dispatch task. Must be called exactly once, on an
    /// `Unstarted` manager.
    pub async fn start(self: &Arc<Self>) -> CrdtResult<()> {
        {
            let mut state = self.state.write();
            if *state != ManagerState::Unstarted {
                return Ok(());
            }
            *state = ManagerState::Initialised;
        }
        let mut inbound = self.transport.subscribe();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                manager.dispatch_inbound(envelope).await;
            }
        });
        *self.inbound_task.write() = Some(handle);
        tracing::debug!(node_id = %self.config.node_id, "crdt manager started");
        Ok(())
    }

    fn ensure_initialised(&self) -> CrdtResult<()> {
        match *self.state.read() {
            ManagerState::Initialised => Ok(()),
            ManagerState::Unstarted => Err(CrdtError::NotInitialised),
            ManagerState::Closed => Err(CrdtError::AlreadyClosed),
        }
    }

    /// Register a CRDT under its own id. Persists an initial snapshot and
    /// emits a `Registered` update event.
    pub async fn register(&self, crdt: AnyCrdt) -> CrdtResult<()> {
        self.ensure_initialised()?;
        let id = crdt.id().to_owned();
        {
            let mut registry = self.registry.write();
            if registry.contains_key(&id) {
                return Err(CrdtError::DuplicateId(id));
            }
            registry.insert(id.clone(), crdt);
        }
        self.persist(&id).await?;
        let _ = self.update_tx.send(UpdateEvent::Registered {
            crdt_id: id.clone(),
        });
        tracing::debug!(crdt_id = %id, "registered crdt");
        Ok(())
    }

    /// Detach a CRDT from the registry without deleting its persisted
    /// state. Returns whether anything was removed.
    pub fn unregister(&self, id: &str) -> CrdtResult<bool> {
        self.ensure_initialised()?;
        let removed = self.registry.write().remove(id).is_some();
        if removed {
            let _ = self.update_tx.send(UpdateEvent::Unregistered {
                crdt_id: id.to_owned(),
            });
        }
        Ok(removed)
    }

    /// Look up a registered CRDT by id.
    pub fn get_by_id(&self, id: &str) -> CrdtResult<Option<AnyCrdt>> {
        self.ensure_initialised()?;
        Ok(self.registry.read().get(id).map(AnyCrdt::copy))
    }

    /// List every registered CRDT's id.
    pub fn list_ids(&self) -> CrdtResult<Vec<String>> {
        self.ensure_initialised()?;
        Ok(self.registry.read().keys().cloned().collect())
    }

    /// List every registered CRDT.
    pub fn list_all(&self) -> CrdtResult<Vec<AnyCrdt>> {
        self.ensure_initialised()?;
        Ok(self.registry.read().values().map(AnyCrdt::copy).collect())
    }

    /// Apply a local operation, persist, and publish it to the transport.
    /// Transport publish failures are logged rather than propagated — the
    /// write is already committed locally and persisted by the time we
    /// reach it (see DESIGN.md).
    pub async fn perform_operation(
        &self,
        id: &str,
        operation: &str,
        data: Map<String, Value>,
    ) -> CrdtResult<Operation> {
        self.ensure_initialised()?;
        let op = {
            let registry = self.registry.read();
            let crdt = registry.get(id).ok_or_else(|| CrdtError::NotFound(id.to_owned()))?;
            crdt.create_op(operation, data, &self.config.node_id, env::time_now_millis())
                .map_err(|e| e.into_operation_failed())?
        };
        {
            let mut registry = self.registry.write();
            let crdt = registry
                .get_mut(id)
                .ok_or_else(|| CrdtError::NotFound(id.to_owned()))?;
            crdt.apply_op(&op).map_err(|e| e.into_operation_failed())?;
        }
        self.persist(id)
            .await
            .map_err(|e| e.into_operation_failed())?;

        let _ = self.update_tx.send(UpdateEvent::Applied {
            crdt_id: id.to_owned(),
            source: EventSource::Local,
        });
        let _ = self.operation_tx.send(OperationEvent {
            operation: op.clone(),
            source: EventSource::Local,
        });

        if let Err(err) = self
            .transport
            .publish(Envelope::Operation {
                operation: op.clone(),
            })
            .await
        {
            tracing::warn!(crdt_id = %id, error = %err, "failed to publish operation to transport");
        }

        tracing::debug!(crdt_id = %id, operation = %operation, "performed local operation");
        Ok(op)
    }

    /// Publish a `crdt_sync` envelope addressed to a single peer, carrying
    /// snapshots of every registered CRDT. Like `perform_operation`, a
    /// transport publish failure is logged rather than propagated: the
    /// gossip surface is best-effort — the sender does not wait for
    /// receivers.
    pub async fn sync_with(&self, peer_id: &str) -> CrdtResult<()> {
        self.ensure_initialised()?;
        let states = self.snapshot_all();
        let count = states.len();
        if let Err(err) = self
            .transport
            .publish(Envelope::Sync {
                target_peer: Some(peer_id.to_owned()),
                states,
            })
            .await
        {
            tracing::warn!(peer_id = %peer_id, error = %err, "failed to publish sync envelope");
        }
        let _ = self.sync_tx.send(SyncEvent {
            kind: SyncKind::Sent,
            peer_id: Some(peer_id.to_owned()),
            count,
        });
        Ok(())
    }

    /// Publish a `crdt_force_sync` envelope carrying every registered
    /// CRDT's snapshot to all peers.
    pub async fn force_sync(&self) -> CrdtResult<()> {
        self.ensure_initialised()?;
        let states = self.snapshot_all();
        let count = states.len();
        if let Err(err) = self.transport.publish(Envelope::ForceSync { states }).await {
            tracing::warn!(error = %err, "failed to publish force-sync envelope");
        }
        let _ = self.sync_tx.send(SyncEvent {
            kind: SyncKind::ForceSent,
            peer_id: None,
            count,
        });
        Ok(())
    }

    /// Idempotent shutdown: cancels the inbound-dispatch task and closes
    /// the store.
    pub async fn close(&self) -> CrdtResult<()> {
        {
            let mut state = self.state.write();
            if *state == ManagerState::Closed {
                return Ok(());
            }
            *state = ManagerState::Closed;
        }
        if let Some(handle) = self.inbound_task.write().take() {
            handle.abort();
        }
        self.store.close().await.map_err(CrdtError::StoreError)?;
        tracing::debug!(node_id = %self.config.node_id, "crdt manager closed");
        Ok(())
    }

    fn snapshot_all(&self) -> Map<String, Value> {
        let registry = self.registry.read();
        registry
            .values()
            .map(|crdt| (crdt.id().to_owned(), Value::Object(crdt.snapshot())))
            .collect()
    }

    async fn persist(&self, id: &str) -> CrdtResult<()> {
        let snapshot = {
            let registry = self.registry.read();
            registry
                .get(id)
                .ok_or_else(|| CrdtError::NotFound(id.to_owned()))?
                .snapshot()
        };
        self.store
            .save(id, snapshot)
            .await
            .map_err(CrdtError::StoreError)
    }

    /// Inbound dispatch. Per-envelope failures are isolated and logged — a
    /// bad envelope must never tear down the manager.
    async fn dispatch_inbound(&self, envelope: InboundEnvelope) {
        if let Err(err) = self.handle_inbound(envelope).await {
            tracing::warn!(error = %err, "dropping inbound envelope after processing failure");
        }
    }

    async fn handle_inbound(&self, envelope: InboundEnvelope) -> CrdtResult<()> {
        if *self.state.read() != ManagerState::Initialised {
            return Ok(());
        }
        match envelope.payload {
            Envelope::Operation { operation } => self.handle_inbound_operation(operation).await,
            Envelope::Sync {
                target_peer,
                states,
            } => {
                if let Some(target) = &target_peer {
                    if target != &self.config.node_id {
                        return Ok(());
                    }
                }
                self.merge_inbound_states(states, SyncKind::Received, Some(envelope.node_id))
                    .await
            }
            Envelope::ForceSync { states } => {
                self.merge_inbound_states(states, SyncKind::ForcedReceived, None)
                    .await
            }
        }
    }

    async fn handle_inbound_operation(&self, operation: Operation) -> CrdtResult<()> {
        // An operation we originated ourselves was already applied and
        // persisted synchronously in `perform_operation`; some transports
        // (e.g. a shared broadcast bus in tests) loop a publisher's own
        // sends back to its own subscription, so this must be a no-op
        // rather than a second, non-idempotent apply.
        if operation.node_id == self.config.node_id {
            return Ok(());
        }
        let applied = {
            let mut registry = self.registry.write();
            match registry.get_mut(&operation.crdt_id) {
                Some(crdt) => {
                    crdt.apply_op(&operation)?;
                    true
                }
                None => false,
            }
        };
        if !applied {
            return Ok(());
        }
        self.persist(&operation.crdt_id).await?;
        let _ = self.update_tx.send(UpdateEvent::Applied {
            crdt_id: operation.crdt_id.clone(),
            source: EventSource::Remote,
        });
        let _ = self.operation_tx.send(OperationEvent {
            operation,
            source: EventSource::Remote,
        });
        Ok(())
    }

    async fn merge_inbound_states(
        &self,
        states: Map<String, Value>,
        kind: SyncKind,
        peer_id: Option<String>,
    ) -> CrdtResult<()> {
        let mut touched = Vec::new();
        for (id, snapshot) in &states {
            let Some(snapshot) = snapshot.as_object() else {
                continue;
            };
            let mut registry = self.registry.write();
            if let Some(crdt) = registry.get_mut(id) {
                crdt.merge(snapshot)?;
                touched.push(id.clone());
            }
        }
        for id in &touched {
            self.persist(id).await?;
            let _ = self.update_tx.send(UpdateEvent::Merged {
                crdt_id: id.clone(),
                source: EventSource::Remote,
            });
        }
        let _ = self.sync_tx.send(SyncEvent {
            kind,
            peer_id,
            count: states.len(),
        });
        Ok(())
    }
}
