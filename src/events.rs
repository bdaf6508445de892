//! The manager's broadcast event streams: `onUpdate`, `onOperation`,
//! `onSync`. Each is a `tokio::sync::broadcast` channel — fan-out, sender
//! never blocks on a slow subscriber, late subscribers miss prior events —
//! mirroring `calimero-node`'s `NodeEvents` broadcast pattern
//! (`crates/node/tests/identity.rs`).

use crate::op::Operation;

/// Whether an applied operation/merge originated locally or arrived over
/// the gossip transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSource {
    Local,
    Remote,
}

/// Why an `onSync` event fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncKind {
    /// This replica published a `syncWith` envelope.
    Sent,
    /// This replica published a `forceSync` envelope.
    ForceSent,
    /// A `crdt_sync` envelope addressed to us (or broadcast) was merged.
    Received,
    /// A `crdt_force_sync` envelope was merged.
    ForcedReceived,
}

/// `onUpdate`: registration, unregistration, applied ops, and merges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateEvent {
    Registered { crdt_id: String },
    Unregistered { crdt_id: String },
    Applied { crdt_id: String, source: EventSource },
    Merged { crdt_id: String, source: EventSource },
}

/// `onOperation`: every operation the manager applied, local or remote.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationEvent {
    pub operation: Operation,
    pub source: EventSource,
}

/// `onSync`: every sync publication and reception, with peer id and count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncEvent {
    pub kind: SyncKind,
    /// The addressed peer for `Sent`/`Received`, `None` for broadcast
    /// (`ForceSent`/`ForcedReceived`, or an unaddressed `syncWith`).
    pub peer_id: Option<String>,
    /// How many CRDT snapshots this sync publication/reception carried.
    pub count: usize,
}
