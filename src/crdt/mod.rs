//! The ten CRDT variants and the polymorphic surface that lets the manager
//! dispatch by `type` tag without matching on a concrete variant.

pub mod any;
pub mod flag;
pub mod g_counter;
pub mod g_set;
pub mod lww_map;
pub mod lww_register;
pub mod mv_register;
pub mod or_map;
pub mod or_set;
pub mod pn_counter;
pub mod rga;
pub mod stamp;

use serde_json::{Map, Value};

use crate::error::CrdtError;

/// Shared half of `merge`'s `StateTypeMismatch` check: the incoming
/// snapshot's `type` and `id` must equal this CRDT's.
pub fn check_type(
    self_id: &str,
    self_type: &str,
    other: &Map<String, Value>,
) -> Result<(), CrdtError> {
    let other_type = other.get("type").and_then(Value::as_str).unwrap_or("");
    let other_id = other.get("id").and_then(Value::as_str).unwrap_or("");
    if other_type != self_type || other_id != self_id {
        return Err(CrdtError::StateTypeMismatch {
            expected_id: self_id.to_owned(),
            expected_type: self_type.to_owned(),
            actual_id: other_id.to_owned(),
            actual_type: other_type.to_owned(),
        });
    }
    Ok(())
}
