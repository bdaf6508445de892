//! Observed-remove set (spec §4.5): every add carries a unique tag; a
//! remove only retires tags it observed, so a concurrent add the remover
//! never saw survives the merge (invariant 3, property 6).

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::env;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "ORSet";

#[derive(Clone, Debug, PartialEq)]
pub struct OrSet {
    id: String,
    /// element -> tags observed for it (including removed ones, per the
    /// observed-remove contract: tombstones stay indexed by element so a
    /// later remove can still find them).
    tags: BTreeMap<String, BTreeSet<String>>,
    removed_tags: BTreeSet<String>,
}

impl OrSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: BTreeMap::new(),
            removed_tags: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Elements with at least one non-removed tag.
    pub fn value(&self) -> BTreeSet<String> {
        self.tags
            .iter()
            .filter(|(_, tags)| tags.iter().any(|t| !self.removed_tags.contains(t)))
            .map(|(e, _)| e.clone())
            .collect()
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let mut tags = BTreeMap::new();
        if let Some(obj) = snapshot.get("tags").and_then(Value::as_object) {
            for (element, tag_list) in obj {
                let set: BTreeSet<String> = tag_list
                    .as_array()
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                    .unwrap_or_default();
                tags.insert(element.clone(), set);
            }
        }
        let removed_tags = snapshot
            .get("removedTags")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default();
        Ok(Self {
            id,
            tags,
            removed_tags,
        })
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "add" => {
                let element = payload::require_str(&op.data, &self.id, &op.operation, "element")?;
                let tag = match payload::optional_str(&op.data, "tag") {
                    Some(t) => t.to_owned(),
                    None => env::generate_id(&op.node_id, op.timestamp),
                };
                self.tags
                    .entry(element.to_owned())
                    .or_default()
                    .insert(tag);
                Ok(())
            }
            "remove" => {
                let element = payload::require_str(&op.data, &self.id, &op.operation, "element")?;
                match payload::optional_str(&op.data, "tag") {
                    Some(tag) => {
                        self.removed_tags.insert(tag.to_owned());
                    }
                    None => {
                        if let Some(observed) = self.tags.get(element) {
                            for tag in observed.clone() {
                                self.removed_tags.insert(tag);
                            }
                        }
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
        let tags: Map<String, Value> = self
            .tags
            .iter()
            .map(|(e, ts)| {
                (
                    e.clone(),
                    Value::Array(ts.iter().map(|t| json!(t)).collect()),
                )
            })
            .collect();
        map.insert("tags".into(), Value::Object(tags));
        map.insert(
            "removedTags".into(),
            Value::Array(self.removed_tags.iter().map(|t| json!(t)).collect()),
        );
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        if let Some(obj) = other.get("tags").and_then(Value::as_object) {
            for (element, tag_list) in obj {
                if let Some(arr) = tag_list.as_array() {
                    let entry = self.tags.entry(element.clone()).or_default();
                    for v in arr {
                        if let Some(t) = v.as_str() {
                            entry.insert(t.to_owned());
                        }
                    }
                }
            }
        }
        if let Some(arr) = other.get("removedTags").and_then(Value::as_array) {
            for v in arr {
                if let Some(t) = v.as_str() {
                    self.removed_tags.insert(t.to_owned());
                }
            }
        }
        Ok(())
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        self.tags.clear();
        self.removed_tags.clear();
    }

    /// Invariant 3: every removed tag must appear in some element's tag set.
    pub fn validate(&self) -> CrdtResult<()> {
        let known: BTreeSet<&String> = self.tags.values().flatten().collect();
        for tag in &self.removed_tags {
            if !known.contains(tag) {
                return Err(CrdtError::InvariantViolated {
                    crdt_id: self.id.clone(),
                    reason: format!("removed tag `{tag}` is not associated with any element"),
                });
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
        if name != "add" && name != "remove" {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}
