//! Multi-value register: keeps every value whose vector clock is
//! concurrent with the rest, so true concurrent writes are surfaced to the
//! caller instead of silently dropped (contrast LWW-Register).

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "MVRegister";

pub type VectorClock = BTreeMap<String, u64>;

fn clock_get(clock: &VectorClock, replica: &str) -> u64 {
    clock.get(replica).copied().unwrap_or(0)
}

/// `true` if `a` dominates `b`: `a[r] >= b[r]` everywhere, strictly greater
/// somewhere.
pub fn dominates(a: &VectorClock, b: &VectorClock) -> bool {
    let replicas = a.keys().chain(b.keys());
    let mut strictly_greater = false;
    for r in replicas {
        let (av, bv) = (clock_get(a, r), clock_get(b, r));
        if av < bv {
            return false;
        }
        if av > bv {
            strictly_greater = true;
        }
    }
    strictly_greater
}

fn clock_to_value(clock: &VectorClock) -> Value {
    Value::Object(clock.iter().map(|(k, v)| (k.clone(), json!(v))).collect())
}

fn clock_from_value(v: &Value) -> VectorClock {
    v.as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq)]
pub struct MvRegister {
    id: String,
    /// value (canonical JSON string) -> (value, clock). Residual set is
    /// kept as an antichain per invariant 4.
    entries: BTreeMap<String, (Value, VectorClock)>,
}

fn value_key(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

impl MvRegister {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The current concurrent set of `(value, clock)` pairs.
    pub fn values(&self) -> Vec<(&Value, &VectorClock)> {
        self.entries.values().map(|(v, c)| (v, c)).collect()
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let mut entries = BTreeMap::new();
        if let Some(arr) = snapshot.get("entries").and_then(Value::as_array) {
            for entry in arr {
                if let Some(obj) = entry.as_object() {
                    if let Some(value) = obj.get("value") {
                        let clock = obj.get("clock").map(clock_from_value).unwrap_or_default();
                        entries.insert(value_key(value), (value.clone(), clock));
                    }
                }
            }
        }
        Ok(Self { id, entries })
    }

    /// Core `set` rule shared by `apply_op` and `merge`.
    fn set(&mut self, value: Value, clock: VectorClock) {
        let mut dominated_by_incoming = Vec::new();
        for (key, (_, existing_clock)) in &self.entries {
            if dominates(&clock, existing_clock) {
                dominated_by_incoming.push(key.clone());
            } else if dominates(existing_clock, &clock) {
                // incoming is stale; drop it entirely.
                return;
            }
        }
        for key in dominated_by_incoming {
            self.entries.remove(&key);
        }
        self.entries.insert(value_key(&value), (value, clock));
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "set" => {
                let value = payload::require(&op.data, &self.id, &op.operation, "value")?.clone();
                let clock_value =
                    payload::require_object(&op.data, &self.id, &op.operation, "vectorClock")?;
                let clock: VectorClock = clock_value
                    .iter()
                    .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n)))
                    .collect();
                self.set(value, clock);
                Ok(())
            }
            "remove" => {
                let value = payload::require(&op.data, &self.id, &op.operation, "value")?;
                self.entries.remove(&value_key(value));
                Ok(())
            }
            "clear" => {
                self.entries.clear();
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
        let entries: Vec<Value> = self
            .entries
            .values()
            .map(|(value, clock)| {
                let mut obj = Map::new();
                obj.insert("value".into(), value.clone());
                obj.insert("clock".into(), clock_to_value(clock));
                Value::Object(obj)
            })
            .collect();
        map.insert("entries".into(), Value::Array(entries));
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        if let Some(arr) = other.get("entries").and_then(Value::as_array) {
            for entry in arr {
                if let Some(obj) = entry.as_object() {
                    if let Some(value) = obj.get("value") {
                        let clock = obj.get("clock").map(clock_from_value).unwrap_or_default();
                        self.set(value.clone(), clock);
                    }
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

    /// Invariant 4: no stored value's clock dominates another's.
    pub fn validate(&self) -> CrdtResult<()> {
        let clocks: Vec<&VectorClock> = self.entries.values().map(|(_, c)| c).collect();
        for (i, a) in clocks.iter().enumerate() {
            for (j, b) in clocks.iter().enumerate() {
                if i != j && dominates(a, b) {
                    return Err(CrdtError::InvariantViolated {
                        crdt_id: self.id.clone(),
                        reason: "a stored clock dominates another; antichain violated".into(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn create_op(
        &self,
        name: &str,
        data: Map<String, Value>,
        origin: &str,
        timestamp: i64,
    ) -> CrdtResult<Operation> {
        if !matches!(name, "set" | "remove" | "clear") {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }

    /// Resolve the current concurrent set down to a single value, picked by
    /// `picker`, with a clock that strictly dominates every predecessor
    /// (element-wise max across all residual clocks, then the resolving
    /// replica's component incremented).
    pub fn resolve(
        &self,
        resolving_replica: &str,
        picker: impl FnOnce(&[(&Value, &VectorClock)]) -> usize,
    ) -> Option<(Value, VectorClock)> {
        let current: Vec<(&Value, &VectorClock)> = self.values();
        if current.is_empty() {
            return None;
        }
        let picked_index = picker(&current);
        let picked_value = current[picked_index].0.clone();
        let mut merged_clock = VectorClock::new();
        for (_, clock) in &current {
            for (replica, count) in clock.iter() {
                let entry = merged_clock.entry(replica.clone()).or_insert(0);
                *entry = (*entry).max(*count);
            }
        }
        let entry = merged_clock.entry(resolving_replica.to_owned()).or_insert(0);
        *entry += 1;
        Some((picked_value, merged_clock))
    }
}
