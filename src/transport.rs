//! The gossip/anti-entropy transport contract consumed by the manager. The
//! transport itself, peer discovery and vector-clock bookkeeping are out of
//! scope — this crate only depends on the narrow publish/subscribe surface
//! below, plus an in-memory double for tests, modeled on
//! `sync_sim::transport::SimStream`'s mpsc-channel simulation.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::envelope::{Envelope, InboundEnvelope};

/// Published/consumed by [`Manager`](crate::manager::Manager). A real
/// implementation rides on an anti-entropy gossip protocol; this crate
/// never constructs one, only calls through the trait.
#[async_trait]
pub trait GossipTransport: Send + Sync {
    /// The replica id this transport speaks for.
    fn node_id(&self) -> &str;

    /// Publish `envelope` to the gossip network.
    async fn publish(&self, envelope: Envelope) -> eyre::Result<()>;

    /// Subscribe to the stream of inbound envelopes. Each call to
    /// `Manager::start` takes one subscription, which it tears down in
    /// `close`.
    fn subscribe(&self) -> mpsc::Receiver<InboundEnvelope>;
}

/// An in-memory [`GossipTransport`] backed by a broadcast channel, so
/// several simulated replicas can share one bus in tests — modeled on
/// `NodeEvents`'s broadcast-channel pattern (`crates/node/tests/identity.rs`)
/// and `SimStream`'s mpsc simulation for the per-subscriber receive side.
pub struct MemoryTransport {
    node_id: String,
    bus: broadcast::Sender<InboundEnvelope>,
}

impl MemoryTransport {
    /// Build a transport on a fresh bus (a single-replica island unless
    /// [`MemoryBus::join`] is used to add more).
    pub fn standalone(node_id: impl Into<String>) -> Self {
        let (bus, _) = broadcast::channel(256);
        Self {
            node_id: node_id.into(),
            bus,
        }
    }
}

#[async_trait]
impl GossipTransport for MemoryTransport {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn publish(&self, envelope: Envelope) -> eyre::Result<()> {
        // A send with no subscribers is not an error: publish is
        // fire-and-forget, the sender never waits on receivers.
        let _ = self.bus.send(InboundEnvelope {
            node_id: self.node_id.clone(),
            payload: envelope,
        });
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<InboundEnvelope> {
        let mut rx = self.bus.subscribe();
        let (tx, forwarded) = mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        forwarded
    }
}

/// A shared bus letting several [`MemoryTransport`]s simulate a gossip mesh
/// in tests: every publish on one node's transport is delivered to every
/// other node subscribed to the same bus.
pub struct MemoryBus {
    bus: broadcast::Sender<InboundEnvelope>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        let (bus, _) = broadcast::channel(256);
        Self { bus }
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transport for `node_id` sharing this bus.
    pub fn join(&self, node_id: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            node_id: node_id.into(),
            bus: self.bus.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let transport = MemoryTransport::standalone("a");
        let result = transport
            .publish(Envelope::ForceSync { states: Map::new() })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn a_shared_bus_delivers_to_other_members() {
        let bus = MemoryBus::new();
        let a = bus.join("a");
        let b = bus.join("b");
        let mut rx_b = b.subscribe();

        a.publish(Envelope::ForceSync { states: Map::new() })
            .await
            .unwrap();

        let received = rx_b.recv().await.expect("expected an envelope");
        assert_eq!(received.node_id, "a");
    }
}
