//! The replicable description of a locally (or remotely) originated change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::env;

/// A single CRDT operation, as routed through the manager and published to
/// the gossip transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// The CRDT this operation targets.
    #[serde(rename = "crdtId")]
    pub crdt_id: String,
    /// The operation name, dispatched on by the target variant.
    pub operation: String,
    /// Operation payload; variant-specific.
    pub data: Map<String, Value>,
    /// The replica that originated this operation.
    #[serde(rename = "nodeId")]
    pub node_id: String,
    /// Wall-clock milliseconds at creation time.
    pub timestamp: i64,
    /// Unique (within the originating replica) id, for transport-level
    /// de-duplication. Never relied on for convergence.
    #[serde(rename = "operationId")]
    pub operation_id: String,
}

impl Operation {
    /// Build an operation record, deriving `operation_id` from
    /// `(node_id, timestamp)` when the caller doesn't supply one.
    pub fn new(
        crdt_id: impl Into<String>,
        operation: impl Into<String>,
        data: Map<String, Value>,
        node_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let node_id = node_id.into();
        let operation_id = env::generate_id(&node_id, timestamp);
        Self {
            crdt_id: crdt_id.into(),
            operation: operation.into(),
            data,
            node_id,
            timestamp,
            operation_id,
        }
    }

    /// As [`new`](Self::new), but with a caller-supplied operation id.
    pub fn with_operation_id(
        crdt_id: impl Into<String>,
        operation: impl Into<String>,
        data: Map<String, Value>,
        node_id: impl Into<String>,
        timestamp: i64,
        operation_id: impl Into<String>,
    ) -> Self {
        Self {
            crdt_id: crdt_id.into(),
            operation: operation.into(),
            data,
            node_id: node_id.into(),
            timestamp,
            operation_id: operation_id.into(),
        }
    }
}
