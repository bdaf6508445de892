//! Positive-negative counter (spec §4.3): two grow-only per-replica maps,
//! merged independently by element-wise maximum. Value is `sum(P) - sum(N)`.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "PNCounter";

#[derive(Clone, Debug, PartialEq)]
pub struct PnCounter {
    id: String,
    positive: BTreeMap<String, u64>,
    negative: BTreeMap<String, u64>,
}

impl PnCounter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            positive: BTreeMap::new(),
            negative: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> i64 {
        let p: u64 = self.positive.values().sum();
        let n: u64 = self.negative.values().sum();
        p as i64 - n as i64
    }

    pub fn positive(&self) -> &BTreeMap<String, u64> {
        &self.positive
    }

    pub fn negative(&self) -> &BTreeMap<String, u64> {
        &self.negative
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let positive = read_side(&id, snapshot, "positive")?;
        let negative = read_side(&id, snapshot, "negative")?;
        Ok(Self {
            id,
            positive,
            negative,
        })
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "increment" => {
                let amount = require_positive(&self.id, op, "amount")?;
                let entry = self.positive.entry(op.node_id.clone()).or_insert(0);
                *entry += amount;
                Ok(())
            }
            "decrement" => {
                let amount = require_positive(&self.id, op, "amount")?;
                let entry = self.negative.entry(op.node_id.clone()).or_insert(0);
                *entry += amount;
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
        map.insert("positive".into(), side_to_value(&self.positive));
        map.insert("negative".into(), side_to_value(&self.negative));
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        merge_side(&mut self.positive, other, "positive");
        merge_side(&mut self.negative, other, "negative");
        Ok(())
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.positive.clear();
        self.negative.clear();
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
        if name != "increment" && name != "decrement" {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}

fn require_positive(crdt_id: &str, op: &Operation, field: &str) -> CrdtResult<u64> {
    let amount = payload::require_i64(&op.data, crdt_id, &op.operation, field)?;
    if amount <= 0 {
        return Err(CrdtError::InvalidPayload {
            crdt_id: crdt_id.to_owned(),
            operation: op.operation.clone(),
            reason: format!("{field} must be positive"),
        });
    }
    Ok(amount as u64)
}

fn read_side(
    crdt_id: &str,
    snapshot: &Map<String, Value>,
    field: &str,
) -> CrdtResult<BTreeMap<String, u64>> {
    let mut out = BTreeMap::new();
    if let Some(raw) = snapshot.get(field).and_then(Value::as_object) {
        for (replica, v) in raw {
            let n = v.as_i64().ok_or_else(|| CrdtError::InvalidPayload {
                crdt_id: crdt_id.to_owned(),
                operation: "from_snapshot".into(),
                reason: format!("{field}.{replica} is not an integer"),
            })?;
            if n < 0 {
                return Err(CrdtError::InvalidPayload {
                    crdt_id: crdt_id.to_owned(),
                    operation: "from_snapshot".into(),
                    reason: format!("{field}.{replica} is negative"),
                });
            }
            out.insert(replica.clone(), n as u64);
        }
    }
    Ok(out)
}

fn side_to_value(side: &BTreeMap<String, u64>) -> Value {
    Value::Object(side.iter().map(|(k, v)| (k.clone(), json!(v))).collect())
}

fn merge_side(side: &mut BTreeMap<String, u64>, other: &Map<String, Value>, field: &str) {
    if let Some(raw) = other.get(field).and_then(Value::as_object) {
        for (replica, v) in raw {
            let n = v.as_u64().unwrap_or(0);
            let entry = side.entry(replica.clone()).or_insert(0);
            *entry = (*entry).max(n);
        }
    }
}
