//! Grow-only set (spec §4.4): elements accumulate, merged by union.
//! Elements are canonicalised to strings for transport (spec §9).

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "GSet";

#[derive(Clone, Debug, PartialEq)]
pub struct GSet {
    id: String,
    elements: BTreeSet<String>,
}

impl GSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            elements: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> &BTreeSet<String> {
        &self.elements
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let elements = snapshot
            .get("elements")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(element_to_string).collect())
            .unwrap_or_default();
        Ok(Self { id, elements })
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "add" => {
                let element = payload::require_str(&op.data, &self.id, &op.operation, "element")?;
                self.elements.insert(element.to_owned());
                Ok(())
            }
            "addAll" => {
                let elements =
                    payload::require_array(&op.data, &self.id, &op.operation, "elements")?;
                for v in elements {
                    if let Some(s) = element_to_string(v) {
                        self.elements.insert(s);
                    } else {
                        return Err(CrdtError::InvalidPayload {
                            crdt_id: self.id.clone(),
                            operation: op.operation.clone(),
                            reason: "elements must be scalars".into(),
                        });
                    }
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
        map.insert(
            "elements".into(),
            Value::Array(self.elements.iter().map(|e| json!(e)).collect()),
        );
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        if let Some(arr) = other.get("elements").and_then(Value::as_array) {
            for v in arr {
                if let Some(s) = element_to_string(v) {
                    self.elements.insert(s);
                }
            }
        }
        Ok(())
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.elements.clear();
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
        if name != "add" && name != "addAll" {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}

fn element_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}
