//! Last-write-wins map: per key, an add-stamp/remove-stamp pair with the
//! same `(timestamp, replica)` tie-break as LWW-Register. A key is present
//! iff its add-stamp strictly outranks its remove-stamp.
//!
//! When add-stamp and remove-stamp are equal (same timestamp, same
//! replica), the key is treated as absent — neither stamp strictly
//! outranks the other, so the add does not win.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::crdt::stamp::outranks;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "LWWMap";

#[derive(Clone, Debug, PartialEq)]
struct Stamp {
    timestamp: i64,
    replica_id: String,
}

#[derive(Clone, Debug, PartialEq, Default)]
struct Entry {
    value: Option<Value>,
    add_stamp: Option<Stamp>,
    remove_stamp: Option<Stamp>,
}

impl Entry {
    fn is_present(&self) -> bool {
        match (&self.add_stamp, &self.remove_stamp) {
            (Some(add), Some(remove)) => outranks(
                add.timestamp,
                &add.replica_id,
                remove.timestamp,
                &remove.replica_id,
            ),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn apply_put(&mut self, value: Value, timestamp: i64, replica_id: &str) {
        let supersedes = match &self.add_stamp {
            None => true,
            Some(existing) => outranks(timestamp, replica_id, existing.timestamp, &existing.replica_id),
        };
        if supersedes {
            self.value = Some(value);
            self.add_stamp = Some(Stamp {
                timestamp,
                replica_id: replica_id.to_owned(),
            });
        }
    }

    fn apply_remove(&mut self, timestamp: i64, replica_id: &str) {
        let supersedes = match &self.remove_stamp {
            None => true,
            Some(existing) => outranks(timestamp, replica_id, existing.timestamp, &existing.replica_id),
        };
        if supersedes {
            self.remove_stamp = Some(Stamp {
                timestamp,
                replica_id: replica_id.to_owned(),
            });
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LwwMap {
    id: String,
    entries: BTreeMap<String, Entry>,
}

impl LwwMap {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Currently present key -> value pairs.
    pub fn value(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_present())
            .filter_map(|(k, e)| e.value.clone().map(|v| (k.clone(), v)))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let entry = self.entries.get(key)?;
        if entry.is_present() {
            entry.value.as_ref()
        } else {
            None
        }
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let mut entries = BTreeMap::new();
        if let Some(obj) = snapshot.get("entries").and_then(Value::as_object) {
            for (key, raw) in obj {
                if let Some(raw) = raw.as_object() {
                    let entry = Entry {
                        value: raw.get("value").cloned(),
                        add_stamp: stamp_from_value(raw.get("addStamp")),
                        remove_stamp: stamp_from_value(raw.get("removeStamp")),
                    };
                    entries.insert(key.clone(), entry);
                }
            }
        }
        Ok(Self { id, entries })
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "put" => {
                let key = payload::require_str(&op.data, &self.id, &op.operation, "key")?.to_owned();
                let value = payload::require(&op.data, &self.id, &op.operation, "value")?.clone();
                let timestamp =
                    payload::optional_i64(&op.data, &self.id, &op.operation, "timestamp", op.timestamp)?;
                self.entries
                    .entry(key)
                    .or_default()
                    .apply_put(value, timestamp, &op.node_id);
                Ok(())
            }
            "remove" => {
                let key = payload::require_str(&op.data, &self.id, &op.operation, "key")?.to_owned();
                let timestamp =
                    payload::optional_i64(&op.data, &self.id, &op.operation, "timestamp", op.timestamp)?;
                self.entries
                    .entry(key)
                    .or_default()
                    .apply_remove(timestamp, &op.node_id);
                Ok(())
            }
            "clear" => {
                let timestamp =
                    payload::optional_i64(&op.data, &self.id, &op.operation, "timestamp", op.timestamp)?;
                let present_keys: Vec<String> = self
                    .entries
                    .iter()
                    .filter(|(_, e)| e.is_present())
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in present_keys {
                    self.entries
                        .entry(key)
                        .or_default()
                        .apply_remove(timestamp, &op.node_id);
                }
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
        let entries: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, e)| {
                let mut obj = Map::new();
                obj.insert("value".into(), e.value.clone().unwrap_or(Value::Null));
                obj.insert("addStamp".into(), stamp_to_value(&e.add_stamp));
                obj.insert("removeStamp".into(), stamp_to_value(&e.remove_stamp));
                (k.clone(), Value::Object(obj))
            })
            .collect();
        map.insert("entries".into(), Value::Object(entries));
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        if let Some(obj) = other.get("entries").and_then(Value::as_object) {
            for (key, raw) in obj {
                let Some(raw) = raw.as_object() else {
                    continue;
                };
                let entry = self.entries.entry(key.clone()).or_default();
                if let Some(add) = stamp_from_value(raw.get("addStamp")) {
                    if let Some(value) = raw.get("value").cloned() {
                        entry.apply_put(value, add.timestamp, &add.replica_id);
                    }
                }
                if let Some(remove) = stamp_from_value(raw.get("removeStamp")) {
                    entry.apply_remove(remove.timestamp, &remove.replica_id);
                }
            }
        }
        Ok(())
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
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
        if !matches!(name, "put" | "remove" | "clear") {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}

fn stamp_to_value(stamp: &Option<Stamp>) -> Value {
    match stamp {
        None => Value::Null,
        Some(s) => {
            let mut obj = Map::new();
            obj.insert("timestamp".into(), json!(s.timestamp));
            obj.insert("replicaId".into(), json!(s.replica_id));
            Value::Object(obj)
        }
    }
}

fn stamp_from_value(value: Option<&Value>) -> Option<Stamp> {
    let obj = value?.as_object()?;
    Some(Stamp {
        timestamp: obj.get("timestamp").and_then(Value::as_i64)?,
        replica_id: obj.get("replicaId").and_then(Value::as_str)?.to_owned(),
    })
}
