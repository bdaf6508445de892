//! The state-store contract consumed by the manager: per-CRDT snapshot
//! persistence with atomic save/load. No concrete backend lives here — only
//! the trait and an in-memory double for tests; persistent storage engines
//! are out of this crate's scope.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Aggregate stats a store reports back from `stats()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreStats {
    pub total_crdts: usize,
    pub size_in_bytes: Option<u64>,
    pub additional: Map<String, Value>,
}

/// Per-CRDT snapshot persistence, keyed by CRDT id. Implementations must
/// make `save` atomic per key and must reject every call after `close`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist `snapshot` under `id`, replacing any prior value atomically.
    async fn save(&self, id: &str, snapshot: Map<String, Value>) -> eyre::Result<()>;

    /// Load the snapshot stored under `id`, or `None` if absent.
    async fn load(&self, id: &str) -> eyre::Result<Option<Map<String, Value>>>;

    /// Whether a snapshot is stored under `id`.
    async fn has(&self, id: &str) -> eyre::Result<bool>;

    /// All ids with a stored snapshot.
    async fn list_ids(&self) -> eyre::Result<Vec<String>>;

    /// Remove the snapshot stored under `id`, returning whether anything
    /// was removed.
    async fn remove(&self, id: &str) -> eyre::Result<bool>;

    /// Drop every stored snapshot.
    async fn clear(&self) -> eyre::Result<()>;

    /// Report aggregate stats over the currently stored snapshots.
    async fn stats(&self) -> eyre::Result<StoreStats>;

    /// Close the store. Every call after this one must fail.
    async fn close(&self) -> eyre::Result<()>;
}

/// An in-memory [`StateStore`], modeled on
/// `meroctl::cli::storage::memory::MemoryStorage` (an `Arc<RwLock<..>>`
/// double backing the same trait its real backends implement). Used by
/// this crate's own tests; not wired to any persistent backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Map<String, Value>>>,
    closed: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> eyre::Result<()> {
        if *self.closed.read() {
            return Err(eyre::eyre!("state store is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save(&self, id: &str, snapshot: Map<String, Value>) -> eyre::Result<()> {
        self.check_open()?;
        self.data.write().insert(id.to_owned(), snapshot);
        Ok(())
    }

    async fn load(&self, id: &str) -> eyre::Result<Option<Map<String, Value>>> {
        self.check_open()?;
        Ok(self.data.read().get(id).cloned())
    }

    async fn has(&self, id: &str) -> eyre::Result<bool> {
        self.check_open()?;
        Ok(self.data.read().contains_key(id))
    }

    async fn list_ids(&self) -> eyre::Result<Vec<String>> {
        self.check_open()?;
        Ok(self.data.read().keys().cloned().collect())
    }

    async fn remove(&self, id: &str) -> eyre::Result<bool> {
        self.check_open()?;
        Ok(self.data.write().remove(id).is_some())
    }

    async fn clear(&self) -> eyre::Result<()> {
        self.check_open()?;
        self.data.write().clear();
        Ok(())
    }

    async fn stats(&self) -> eyre::Result<StoreStats> {
        self.check_open()?;
        let data = self.data.read();
        let size_in_bytes = data
            .values()
            .map(|v| serde_json::to_vec(v).map(|b| b.len() as u64))
            .sum::<serde_json::Result<u64>>()
            .ok();
        Ok(StoreStats {
            total_crdts: data.len(),
            size_in_bytes,
            additional: Map::new(),
        })
    }

    async fn close(&self) -> eyre::Result<()> {
        *self.closed.write() = true;
        Ok(())
    }
}
