//! Small helpers for pulling typed fields out of an operation's JSON-ish
//! payload, turning "missing or ill-typed" into `CrdtError::InvalidPayload`.

use serde_json::{Map, Value};

use crate::error::CrdtError;

pub fn require<'a>(
    data: &'a Map<String, Value>,
    crdt_id: &str,
    operation: &str,
    field: &str,
) -> Result<&'a Value, CrdtError> {
    data.get(field).ok_or_else(|| CrdtError::InvalidPayload {
        crdt_id: crdt_id.to_owned(),
        operation: operation.to_owned(),
        reason: format!("missing field `{field}`"),
    })
}

pub fn require_str<'a>(
    data: &'a Map<String, Value>,
    crdt_id: &str,
    operation: &str,
    field: &str,
) -> Result<&'a str, CrdtError> {
    require(data, crdt_id, operation, field)?
        .as_str()
        .ok_or_else(|| CrdtError::InvalidPayload {
            crdt_id: crdt_id.to_owned(),
            operation: operation.to_owned(),
            reason: format!("field `{field}` is not a string"),
        })
}

pub fn optional_str<'a>(data: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

pub fn require_i64(
    data: &Map<String, Value>,
    crdt_id: &str,
    operation: &str,
    field: &str,
) -> Result<i64, CrdtError> {
    require(data, crdt_id, operation, field)?
        .as_i64()
        .ok_or_else(|| CrdtError::InvalidPayload {
            crdt_id: crdt_id.to_owned(),
            operation: operation.to_owned(),
            reason: format!("field `{field}` is not an integer"),
        })
}

pub fn optional_i64(
    data: &Map<String, Value>,
    crdt_id: &str,
    operation: &str,
    field: &str,
    default: i64,
) -> Result<i64, CrdtError> {
    match data.get(field) {
        None => Ok(default),
        Some(v) => v.as_i64().ok_or_else(|| CrdtError::InvalidPayload {
            crdt_id: crdt_id.to_owned(),
            operation: operation.to_owned(),
            reason: format!("field `{field}` is not an integer"),
        }),
    }
}

pub fn require_index(
    data: &Map<String, Value>,
    crdt_id: &str,
    operation: &str,
    field: &str,
) -> Result<usize, CrdtError> {
    let n = require_i64(data, crdt_id, operation, field)?;
    usize::try_from(n).map_err(|_| CrdtError::InvalidPayload {
        crdt_id: crdt_id.to_owned(),
        operation: operation.to_owned(),
        reason: format!("field `{field}` must be a non-negative index"),
    })
}

pub fn require_object<'a>(
    data: &'a Map<String, Value>,
    crdt_id: &str,
    operation: &str,
    field: &str,
) -> Result<&'a Map<String, Value>, CrdtError> {
    require(data, crdt_id, operation, field)?
        .as_object()
        .ok_or_else(|| CrdtError::InvalidPayload {
            crdt_id: crdt_id.to_owned(),
            operation: operation.to_owned(),
            reason: format!("field `{field}` is not an object"),
        })
}

pub fn require_array<'a>(
    data: &'a Map<String, Value>,
    crdt_id: &str,
    operation: &str,
    field: &str,
) -> Result<&'a Vec<Value>, CrdtError> {
    require(data, crdt_id, operation, field)?
        .as_array()
        .ok_or_else(|| CrdtError::InvalidPayload {
            crdt_id: crdt_id.to_owned(),
            operation: operation.to_owned(),
            reason: format!("field `{field}` is not an array"),
        })
}
