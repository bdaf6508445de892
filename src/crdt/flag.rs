//! Enable-wins flag: a single boolean merged by logical OR — the
//! degenerate one-bit OR-Set, so a concurrent disable can never erase an
//! enable it didn't observe.

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "EnableWinsFlag";

#[derive(Clone, Debug, PartialEq)]
pub struct EnableWinsFlag {
    id: String,
    value: bool,
}

impl EnableWinsFlag {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> bool {
        self.value
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let value = snapshot.get("value").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self { id, value })
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "enable" => {
                self.value = true;
                Ok(())
            }
            "disable" => {
                self.value = false;
                Ok(())
            }
            "toggle" => {
                self.value = !self.value;
                Ok(())
            }
            "set" => {
                let value = payload::require(&op.data, &self.id, &op.operation, "value")?;
                self.value = value.as_bool().ok_or_else(|| CrdtError::InvalidPayload {
                    crdt_id: self.id.clone(),
                    operation: op.operation.clone(),
                    reason: "value must be a boolean".into(),
                })?;
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
        map.insert("value".into(), json!(self.value));
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        let other_value = other.get("value").and_then(Value::as_bool).unwrap_or(false);
        self.value |= other_value;
        Ok(())
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.value = false;
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
        if !matches!(name, "enable" | "disable" | "toggle" | "set") {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}
