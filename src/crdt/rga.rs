//! Replicated growable array (spec §4.10): a total-order sequence with
//! tombstones. Every element carries a globally unique, lexicographically
//! comparable UID; elements live in a UID-sorted map so the visible
//! projection — the non-tombstoned subsequence in UID order — never needs
//! a separate resort step (invariant 5, open question §9.1).
//!
//! UIDs are generated as `<replica>_<epoch-ms>_<seq>`, where `seq` is a
//! zero-padded per-replica insert counter rather than a random suffix
//! (§4.10 "implementations may substitute a stronger scheme… provided they
//! preserve total order, determinism"). A random suffix only disambiguates
//! same-millisecond inserts by chance; a monotonic counter guarantees that
//! characters inserted by one replica in one call (e.g. `insertText`) keep
//! their insertion order instead of sorting by coin flip.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::crdt::check_type;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;
use crate::payload;

pub const TYPE_TAG: &str = "RGAArray";

#[derive(Clone, Debug, PartialEq)]
struct Element {
    value: Value,
    replica_id: String,
    created_at: i64,
    tombstoned: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rga {
    id: String,
    /// Keyed and iterated by UID, which fixes total order for free.
    elements: BTreeMap<String, Element>,
}

impl Rga {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            elements: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Non-tombstoned elements, in UID order.
    pub fn visible(&self) -> Vec<&Value> {
        self.elements
            .values()
            .filter(|e| !e.tombstoned)
            .map(|e| &e.value)
            .collect()
    }

    fn visible_len(&self) -> usize {
        self.elements.values().filter(|e| !e.tombstoned).count()
    }

    /// UID of the `index`-th visible element, if any.
    fn uid_at(&self, index: usize) -> Option<&str> {
        self.elements
            .iter()
            .filter(|(_, e)| !e.tombstoned)
            .nth(index)
            .map(|(uid, _)| uid.as_str())
    }

    /// Builds the next UID for an insert made by `replica_id` at
    /// `timestamp`: the insert counter is one past the highest counter
    /// already used by that replica in this instance, so a batch of
    /// inserts from the same replica (e.g. `insert_text`) sorts in the
    /// order they were inserted rather than by random tie-break.
    fn next_uid(&self, replica_id: &str, timestamp: i64) -> String {
        let seq = self
            .elements
            .keys()
            .filter_map(|uid| parse_seq(uid, replica_id))
            .max()
            .map_or(0, |max| max + 1);
        format!("{replica_id}_{timestamp}_{seq:010}")
    }

    /// For character-string element CRDTs: the visible sequence joined as
    /// text. Fails if any element isn't a single-character string.
    pub fn get_text(&self) -> CrdtResult<String> {
        let mut out = String::new();
        for value in self.visible() {
            let s = value.as_str().ok_or_else(|| CrdtError::InvalidPayload {
                crdt_id: self.id.clone(),
                operation: "get_text".into(),
                reason: "element is not a character string".into(),
            })?;
            out.push_str(s);
        }
        Ok(out)
    }

    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let id = payload::require_str(snapshot, "<unknown>", "from_snapshot", "id")?.to_owned();
        let mut elements = BTreeMap::new();
        if let Some(arr) = snapshot.get("elements").and_then(Value::as_array) {
            for raw in arr {
                let Some(obj) = raw.as_object() else { continue };
                let Some(uid) = obj.get("uid").and_then(Value::as_str) else {
                    continue;
                };
                let value = obj.get("value").cloned().unwrap_or(Value::Null);
                let replica_id = obj
                    .get("replicaId")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_owned();
                let created_at = obj.get("createdAt").and_then(Value::as_i64).unwrap_or(0);
                let tombstoned = obj.get("tombstoned").and_then(Value::as_bool).unwrap_or(false);
                elements.insert(
                    uid.to_owned(),
                    Element {
                        value,
                        replica_id,
                        created_at,
                        tombstoned,
                    },
                );
            }
        }
        Ok(Self { id, elements })
    }

    fn insert_at(&mut self, index: usize, value: Value, uid: Option<String>, replica_id: &str, timestamp: i64) -> CrdtResult<()> {
        let len = self.visible_len();
        if index > len {
            return Err(CrdtError::OutOfRange { index, len });
        }
        let uid = match uid {
            Some(uid) => uid,
            None => self.next_uid(replica_id, timestamp),
        };
        self.elements.insert(
            uid,
            Element {
                value,
                replica_id: replica_id.to_owned(),
                created_at: timestamp,
                tombstoned: false,
            },
        );
        Ok(())
    }

    fn delete_at(&mut self, index: usize) -> CrdtResult<()> {
        let len = self.visible_len();
        if index >= len {
            return Err(CrdtError::OutOfRange { index, len });
        }
        let uid = self.uid_at(index).expect("index validated above").to_owned();
        self.elements.get_mut(&uid).expect("uid just looked up").tombstoned = true;
        Ok(())
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        match op.operation.as_str() {
            "insert" => {
                let index = payload::require_index(&op.data, &self.id, &op.operation, "index")?;
                let value =
                    payload::require(&op.data, &self.id, &op.operation, "element")?.clone();
                let uid = payload::optional_str(&op.data, "uid").map(str::to_owned);
                self.insert_at(index, value, uid, &op.node_id, op.timestamp)
            }
            "delete" => {
                if let Some(uid) = payload::optional_str(&op.data, "uid") {
                    if let Some(element) = self.elements.get_mut(uid) {
                        element.tombstoned = true;
                    }
                    Ok(())
                } else {
                    let index = payload::require_index(&op.data, &self.id, &op.operation, "index")?;
                    self.delete_at(index)
                }
            }
            other => Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: other.to_owned(),
            }),
        }
    }

    /// Convenience for text sequences: insert each character of `text` in
    /// order, starting at `pos`.
    pub fn insert_text(&mut self, pos: usize, text: &str, replica_id: &str, timestamp: i64) -> CrdtResult<()> {
        for (i, ch) in text.chars().enumerate() {
            self.insert_at(pos + i, json!(ch.to_string()), None, replica_id, timestamp)?;
        }
        Ok(())
    }

    /// Convenience for text sequences: tombstone the visible range
    /// `[start, end)`, deleting from the end so earlier indices stay valid.
    pub fn delete_range(&mut self, start: usize, end: usize) -> CrdtResult<()> {
        for index in (start..end).rev() {
            self.delete_at(index)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("type".into(), json!(TYPE_TAG));
        map.insert("id".into(), json!(self.id));
        let elements: Vec<Value> = self
            .elements
            .iter()
            .map(|(uid, e)| {
                let mut obj = Map::new();
                obj.insert("uid".into(), json!(uid));
                obj.insert("value".into(), e.value.clone());
                obj.insert("replicaId".into(), json!(e.replica_id));
                obj.insert("createdAt".into(), json!(e.created_at));
                obj.insert("tombstoned".into(), json!(e.tombstoned));
                Value::Object(obj)
            })
            .collect();
        map.insert("elements".into(), Value::Array(elements));
        map
    }

    /// Union by UID; duplicates are idempotent; tombstones OR monotonically.
    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        check_type(&self.id, TYPE_TAG, other)?;
        if let Some(arr) = other.get("elements").and_then(Value::as_array) {
            for raw in arr {
                let Some(obj) = raw.as_object() else { continue };
                let Some(uid) = obj.get("uid").and_then(Value::as_str) else {
                    continue;
                };
                let tombstoned = obj.get("tombstoned").and_then(Value::as_bool).unwrap_or(false);
                match self.elements.get_mut(uid) {
                    Some(existing) => existing.tombstoned |= tombstoned,
                    None => {
                        let value = obj.get("value").cloned().unwrap_or(Value::Null);
                        let replica_id = obj
                            .get("replicaId")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_owned();
                        let created_at = obj.get("createdAt").and_then(Value::as_i64).unwrap_or(0);
                        self.elements.insert(
                            uid.to_owned(),
                            Element {
                                value,
                                replica_id,
                                created_at,
                                tombstoned,
                            },
                        );
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
        self.elements.clear();
    }

    /// Invariant 5: UIDs are keys of a map, so uniqueness is structural;
    /// nothing further to check.
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
        if name != "insert" && name != "delete" {
            return Err(CrdtError::UnknownOperation {
                crdt_id: self.id.clone(),
                operation: name.to_owned(),
            });
        }
        Ok(Operation::new(&self.id, name, data, origin, timestamp))
    }
}

/// Extracts the trailing `seq` component from a `<replica>_<ms>_<seq>` UID,
/// if `uid` was minted for `replica_id` by [`Rga::next_uid`]. UIDs that
/// don't match that shape (a different replica, or a caller-supplied UID
/// in some other format) are simply ignored by the counter.
fn parse_seq(uid: &str, replica_id: &str) -> Option<u64> {
    let rest = uid.strip_prefix(replica_id)?.strip_prefix('_')?;
    let (_, seq) = rest.rsplit_once('_')?;
    seq.parse().ok()
}
