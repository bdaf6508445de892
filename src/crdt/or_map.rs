//! Observed-remove map: like OR-Set over keys, but each present key owns
//! an inner CRDT that is itself merged recursively when both sides know
//! about the key.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::crdt::any::{AnyCrdt, CrdtFactory, CrdtType};
use crate::crdt::check_type;
use crate::env;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "ORMap";

#[derive(Clone)]
pub struct OrMap {
    id: String,
    tags: BTreeMap<String, BTreeSet<String>>,
    removed_tags: BTreeSet<String>,
    values: BTreeMap<String, AnyCrdt>,
    factory: Option<CrdtFactory>,
}

impl std::fmt::Debug for OrMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrMap")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("removed_tags", &self.removed_tags)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

impl PartialEq for OrMap {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tags == other.tags && self.removed_tags == other.removed_tags
    }
}

impl OrMap {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: BTreeMap::new(),
            removed_tags: BTreeSet::new(),
            values: BTreeMap::new(),
            factory: None,
        }
    }

    pub fn with_factory(mut self, factory: CrdtFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn set_factory(&mut self, factory: CrdtFactory) {
        self.factory = Some(factory);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Keys with at least one non-removed tag.
    pub fn keys(&self) -> BTreeSet<String> {
        self.tags
            .iter()
            .filter(|(_, tags)| tags.iter().any(|t| !self.removed_tags.contains(t)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&AnyCrdt> {
        if self.keys().contains(key) {
            self.values.get(key)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut AnyCrdt> {
        self.values.get_mut(key)
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let mut tags = BTreeMap::new();
        if let Some(obj) = snapshot.get("tags").and_then(Value::as_object) {
            for (key, tag_list) in obj {
                let set: BTreeSet<String> = tag_list
                    .as_array()
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                    .unwrap_or_default();
                tags.insert(key.clone(), set);
            }
        }
        let removed_tags = snapshot
            .get("removedTags")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default();
        let mut values = BTreeMap::new();
        if let Some(obj) = snapshot.get("values").and_then(Value::as_object) {
            for (key, inner) in obj {
                if let Some(inner) = inner.as_object() {
                    values.insert(key.clone(), AnyCrdt::from_snapshot(inner)?);
                }
            }
        }
        Ok(Self {
            id,
            tags,
            removed_tags,
            values,
            factory: None,
        })
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "add" => {
                let key = payload::require_str(&op.data, &self.id, &op.operation, "key")?.to_owned();
                let crdt_type_name =
                    payload::require_str(&op.data, &self.id, &op.operation, "crdtType")?;
                let crdt_type = CrdtType::parse(crdt_type_name).ok_or_else(|| {
                    CrdtError::InvalidPayload {
                        crdt_id: self.id.clone(),
                        operation: op.operation.clone(),
                        reason: format!("unknown crdtType `{crdt_type_name}`"),
                    }
                })?;
                let crdt_id = payload::require_str(&op.data, &self.id, &op.operation, "crdtId")?
                    .to_owned();
                let factory = self.factory.as_ref().ok_or_else(|| {
                    CrdtError::FactoryMissing(key.clone())
                })?;
                let tag = match payload::optional_str(&op.data, "tag") {
                    Some(t) => t.to_owned(),
                    None => env::generate_id(&op.node_id, op.timestamp),
                };
                self.tags.entry(key.clone()).or_default().insert(tag);
                self.values
                    .entry(key)
                    .or_insert_with(|| factory(&crdt_id, crdt_type));
                Ok(())
            }
            "remove" => {
                let key = payload::require_str(&op.data, &self.id, &op.operation, "key")?;
                match payload::optional_str(&op.data, "tag") {
                    Some(tag) => {
                        self.removed_tags.insert(tag.to_owned());
                    }
                    None => {
                        if let Some(observed) = self.tags.get(key) {
                            for tag in observed.clone() {
                                self.removed_tags.insert(tag);
                            }
                        }
                    }
                }
                Ok(())
            }
            "updateValue" => {
                let key = payload::require_str(&op.data, &self.id, &op.operation, "key")?;
                let inner_op =
                    payload::require_object(&op.data, &self.id, &op.operation, "valueOperation")?;
                if !self.keys().contains(key) {
                    return Ok(());
                }
                let Some(inner) = self.values.get_mut(key) else {
                    return Ok(());
                };
                let operation_name = payload::require_str(
                    inner_op,
                    &self.id,
                    &op.operation,
                    "operation",
                )?
                .to_owned();
                let data = inner_op
                    .get("data")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let forwarded =
                    Operation::new(inner.id().to_owned(), operation_name, data, &op.node_id, op.timestamp);
                inner.apply_op(&forwarded)
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
            .map(|(k, ts)| {
                (
                    k.clone(),
                    Value::Array(ts.iter().map(|t| json!(t)).collect()),
                )
            })
            .collect();
        map.insert("tags".into(), Value::Object(tags));
        map.insert(
            "removedTags".into(),
            Value::Array(self.removed_tags.iter().map(|t| json!(t)).collect()),
        );
        let values: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), Value::Object(v.snapshot())))
            .collect();
        map.insert("values".into(), Value::Object(values));
        map
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        if let Some(obj) = other.get("tags").and_then(Value::as_object) {
            for (key, tag_list) in obj {
                if let Some(arr) = tag_list.as_array() {
                    let entry = self.tags.entry(key.clone()).or_default();
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
        if let Some(obj) = other.get("values").and_then(Value::as_object) {
            for (key, inner_snapshot) in obj {
                let Some(inner_snapshot) = inner_snapshot.as_object() else {
                    continue;
                };
                if let Some(existing) = self.values.get_mut(key) {
                    existing.merge(inner_snapshot)?;
                } else if let Some(factory) = &self.factory {
                    let crdt_type = inner_snapshot
                        .get("type")
                        .and_then(Value::as_str)
                        .and_then(CrdtType::parse)
                        .ok_or_else(|| CrdtError::InvalidPayload {
                            crdt_id: self.id.clone(),
                            operation: "merge".into(),
                            reason: format!("inner crdt for key `{key}` has no valid type"),
                        })?;
                    let crdt_id = inner_snapshot
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or(key);
                    let mut built = factory(crdt_id, crdt_type);
                    built.merge(inner_snapshot)?;
                    self.values.insert(key.clone(), built);
                }
                // else: no factory configured, so we can't materialise the
                // inner crdt; the key's tags still merge above (spec §9.3).
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
        self.values.clear();
    }

    pub fn validate(&self) -> CrdtResult<()> {
        let known: BTreeSet<&String> = self.tags.values().flatten().collect();
        for tag in &self.removed_tags {
            if !known.contains(tag) {
                return Err(CrdtError::InvariantViolated {
                    crdt_id: self.id.clone(),
                    reason: format!("removed tag `{tag}` is not associated with any key"),
                });
            }
        }
        for (key, inner) in &self.values {
            inner.validate().map_err(|e| CrdtError::InvariantViolated {
                crdt_id: self.id.clone(),
                reason: format!("inner crdt for key `{key}` failed validation: {e}"),
            })?;
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
        if !matches!(name, "add" | "remove" | "updateValue") {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}
