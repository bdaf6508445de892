//! The gossip wire formats the manager publishes and consumes. `Envelope`
//! is the outbound/inbound payload shape; `InboundEnvelope` pairs it with
//! the originating replica, matching the `{nodeId, payload}` shape the
//! transport contract delivers.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::op::Operation;

/// The three envelope shapes the manager speaks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// A single locally- or remotely-originated operation.
    #[serde(rename = "crdt_operation")]
    Operation { operation: Operation },
    /// A bag of snapshots addressed to one peer (or broadcast if
    /// `target_peer` is absent).
    #[serde(rename = "crdt_sync")]
    Sync {
        #[serde(rename = "targetPeer", skip_serializing_if = "Option::is_none")]
        target_peer: Option<String>,
        states: Map<String, serde_json::Value>,
    },
    /// A bag of snapshots addressed to every peer, unconditionally.
    #[serde(rename = "crdt_force_sync")]
    ForceSync {
        states: Map<String, serde_json::Value>,
    },
}

/// An envelope as received from the transport, tagged with the replica
/// that published it.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEnvelope {
    pub node_id: String,
    pub payload: Envelope,
}
