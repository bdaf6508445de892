//! Last-write-wins register (spec §4.6): a single value with a
//! `(timestamp, replica)` stamp; ties broken by replica id (invariant 6).

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::crdt::stamp::outranks;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "LWWRegister";

#[derive(Clone, Debug, PartialEq)]
pub struct LwwRegister {
    id: String,
    value: Option<Value>,
    timestamp: i64,
    replica_id: String,
}

impl LwwRegister {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: None,
            timestamp: 0,
            replica_id: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let value = snapshot.get("value").cloned().filter(|v| !v.is_null());
        let timestamp = snapshot.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        let replica_id = snapshot
            .get("replicaId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();
        Ok(Self {
            id,
            value,
            timestamp,
            replica_id,
        })
    }

    fn apply_write(&mut self, value: Value, timestamp: i64, replica_id: &str) {
        if self.timestamp == 0 || outranks(timestamp, replica_id, self.timestamp, &self.replica_id)
        {
            self.value = Some(value);
            self.timestamp = timestamp;
            self.replica_id = replica_id.to_owned();
        }
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "set" => {
                let value = payload::require(&op.data, &self.id, &op.operation, "value")?.clone();
                let timestamp =
                    payload::optional_i64(&op.data, &self.id, &op.operation, "timestamp", op.timestamp)?;
                self.apply_write(value, timestamp, &op.node_id);
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
        map.insert("value".into(), self.value.clone().unwrap_or(Value::Null));
        map.insert("timestamp".into(), json!(self.timestamp));
        map.insert("replicaId".into(), json!(self.replica_id));
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        let other_timestamp = other.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        if other_timestamp == 0 {
            return Ok(());
        }
        let other_replica = other
            .get("replicaId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();
        if let Some(value) = other.get("value").cloned().filter(|v| !v.is_null()) {
            self.apply_write(value, other_timestamp, &other_replica);
        }
        Ok(())
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.value = None;
        self.timestamp = 0;
        self.replica_id.clear();
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
        if name != "set" {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}
