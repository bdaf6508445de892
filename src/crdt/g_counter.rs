//! Grow-only counter (spec §4.2): a per-replica count that only ever
//! increases, merged by taking the element-wise maximum.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "GCounter";

#[derive(Clone, Debug, PartialEq)]
pub struct GCounter {
    id: String,
    counts: BTreeMap<String, u64>,
}

impl GCounter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            counts: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sum of all per-replica counts.
    pub fn value(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let mut counts = BTreeMap::new();
        if let Some(raw) = snapshot.get("counts").and_then(Value::as_object) {
            for (replica, v) in raw {
                let n = v.as_i64().ok_or_else(|| CrdtError::InvalidPayload {
                    crdt_id: id.clone(),
                    operation: "from_snapshot".into(),
                    reason: format!("count for `{replica}` is not an integer"),
                })?;
                if n < 0 {
                    return Err(CrdtError::InvalidPayload {
                        crdt_id: id.clone(),
                        operation: "from_snapshot".into(),
                        reason: format!("count for `{replica}` is negative"),
                    });
                }
                counts.insert(replica.clone(), n as u64);
            }
        }
        Ok(Self { id, counts })
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "increment" => {
                let amount =
                    payload::optional_i64(&op.data, &self.id, &op.operation, "amount", 1)?;
                if amount < 0 {
                    return Err(CrdtError::InvalidPayload {
                        crdt_id: self.id.clone(),
                        operation: op.operation.clone(),
                        reason: "amount must be non-negative".into(),
                    });
                }
                if amount == 0 {
                    return Ok(());
                }
                let entry = self.counts.entry(op.node_id.clone()).or_insert(0);
                *entry += amount as u64;
                Ok(())
            }
            other => Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: other.to_owned(),
            }),
        }
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("type".into(), json!(TYPE_TAG));
        map.insert("id".into(), json!(self.id));
        let counts: Map<String, Value> = self
            .counts
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        map.insert("counts".into(), Value::Object(counts));
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        if let Some(raw) = other.get("counts").and_then(Value::as_object) {
            for (replica, v) in raw {
                let n = v.as_u64().unwrap_or(0);
                let entry = self.counts.entry(replica.clone()).or_insert(0);
                *entry = (*entry).max(n);
            }
        }
        Ok(())
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    pub fn validate(&self) -> CrdtResult<()> {
        Ok(())
    }

    pub fn create_op(
        &self,
        name: &str,
        data: Map<String, Value>,
        origin: &str,
        timestamp: i64,
    ) -> CrdtResult<Operation> {
        if name != "increment" {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}
