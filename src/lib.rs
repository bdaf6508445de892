//! A library of Conflict-free Replicated Data Types (CRDTs) and a
//! coordination manager that routes local operations and remote state
//! deltas through them over an anti-entropy gossip transport, preserving
//! the convergence guarantees of each variant's merge semilattice.
//!
//! The gossip transport itself, peer discovery, and persistent storage
//! engines are out of scope — this crate depends on them only through the
//! narrow [`transport::GossipTransport`] and [`store::StateStore`] traits.

pub mod crdt;
pub mod env;
pub mod envelope;
pub mod error;
pub mod events;
pub mod manager;
pub mod op;
pub mod payload;
pub mod store;
pub mod transport;

#[cfg(test)]
mod tests;

pub use crdt::any::{AnyCrdt, CrdtFactory, CrdtType};
pub use env::reset_for_testing;
pub use error::{CrdtError, CrdtResult};
pub use events::{EventSource, OperationEvent, SyncEvent, SyncKind, UpdateEvent};
pub use manager::{Manager, ManagerConfig};
pub use op::Operation;
pub use store::{MemoryStore, StateStore, StoreStats};
pub use transport::{GossipTransport, MemoryBus, MemoryTransport};
