//! The CRDT polymorphic surface (spec §4.1): a closed sum of variants
//! dispatched by a `type` tag, each exposing the same capability set.
//! This is what the manager (§4.12) talks to — it never matches on a
//! concrete variant itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crdt::flag::EnableWinsFlag;
use crate::crdt::g_counter::GCounter;
use crate::crdt::g_set::GSet;
use crate::crdt::lww_map::LwwMap;
use crate::crdt::lww_register::LwwRegister;
use crate::crdt::mv_register::MvRegister;
use crate::crdt::or_map::OrMap;
use crate::crdt::or_set::OrSet;
use crate::crdt::pn_counter::PnCounter;
use crate::crdt::rga::Rga;
use crate::error::{CrdtError, CrdtResult};
use crate::op::Operation;

/// The fixed set of variant tags making up the wire format (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrdtType {
    GCounter,
    PNCounter,
    GSet,
    ORSet,
    LWWRegister,
    MVRegister,
    LWWMap,
    ORMap,
    RGAArray,
    EnableWinsFlag,
}

impl CrdtType {
    pub fn tag(self) -> &'static str {
        match self {
            CrdtType::GCounter => crate::crdt::g_counter::TYPE_TAG,
            CrdtType::PNCounter => crate::crdt::pn_counter::TYPE_TAG,
            CrdtType::GSet => crate::crdt::g_set::TYPE_TAG,
            CrdtType::ORSet => crate::crdt::or_set::TYPE_TAG,
            CrdtType::LWWRegister => crate::crdt::lww_register::TYPE_TAG,
            CrdtType::MVRegister => crate::crdt::mv_register::TYPE_TAG,
            CrdtType::LWWMap => crate::crdt::lww_map::TYPE_TAG,
            CrdtType::ORMap => crate::crdt::or_map::TYPE_TAG,
            CrdtType::RGAArray => crate::crdt::rga::TYPE_TAG,
            CrdtType::EnableWinsFlag => crate::crdt::flag::TYPE_TAG,
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            t if t == crate::crdt::g_counter::TYPE_TAG => CrdtType::GCounter,
            t if t == crate::crdt::pn_counter::TYPE_TAG => CrdtType::PNCounter,
            t if t == crate::crdt::g_set::TYPE_TAG => CrdtType::GSet,
            t if t == crate::crdt::or_set::TYPE_TAG => CrdtType::ORSet,
            t if t == crate::crdt::lww_register::TYPE_TAG => CrdtType::LWWRegister,
            t if t == crate::crdt::mv_register::TYPE_TAG => CrdtType::MVRegister,
            t if t == crate::crdt::lww_map::TYPE_TAG => CrdtType::LWWMap,
            t if t == crate::crdt::or_map::TYPE_TAG => CrdtType::ORMap,
            t if t == crate::crdt::rga::TYPE_TAG => CrdtType::RGAArray,
            t if t == crate::crdt::flag::TYPE_TAG => CrdtType::EnableWinsFlag,
            _ => return None,
        })
    }
}

/// Builds a fresh inner CRDT for an OR-Map key (spec §4.9 `add`). Wrapped
/// in `Arc` so a manager or OR-Map can hand the same factory to many
/// instances without cloning the closure.
pub type CrdtFactory = Arc<dyn Fn(&str, CrdtType) -> AnyCrdt + Send + Sync>;

/// A CRDT of any variant. Dispatches the §4.1 capability set by matching
/// on the tag rather than through a trait object, so `copy()` and the
/// OR-Map's recursive inner storage stay simple value types.
#[derive(Clone, Debug)]
pub enum AnyCrdt {
    GCounter(GCounter),
    PnCounter(PnCounter),
    GSet(GSet),
    OrSet(OrSet),
    LwwRegister(LwwRegister),
    MvRegister(MvRegister),
    LwwMap(LwwMap),
    OrMap(OrMap),
    Rga(Rga),
    Flag(EnableWinsFlag),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            AnyCrdt::GCounter($inner) => $body,
            AnyCrdt::PnCounter($inner) => $body,
            AnyCrdt::GSet($inner) => $body,
            AnyCrdt::OrSet($inner) => $body,
            AnyCrdt::LwwRegister($inner) => $body,
            AnyCrdt::MvRegister($inner) => $body,
            AnyCrdt::LwwMap($inner) => $body,
            AnyCrdt::OrMap($inner) => $body,
            AnyCrdt::Rga($inner) => $body,
            AnyCrdt::Flag($inner) => $body,
        }
    };
}

impl AnyCrdt {
    /// Create an empty CRDT of the given variant.
    pub fn new(id: impl Into<String>, crdt_type: CrdtType) -> Self {
        let id = id.into();
        match crdt_type {
            CrdtType::GCounter => AnyCrdt::GCounter(GCounter::new(id)),
            CrdtType::PNCounter => AnyCrdt::PnCounter(PnCounter::new(id)),
            CrdtType::GSet => AnyCrdt::GSet(GSet::new(id)),
            CrdtType::ORSet => AnyCrdt::OrSet(OrSet::new(id)),
            CrdtType::LWWRegister => AnyCrdt::LwwRegister(LwwRegister::new(id)),
            CrdtType::MVRegister => AnyCrdt::MvRegister(MvRegister::new(id)),
            CrdtType::LWWMap => AnyCrdt::LwwMap(LwwMap::new(id)),
            CrdtType::ORMap => AnyCrdt::OrMap(OrMap::new(id)),
            CrdtType::RGAArray => AnyCrdt::Rga(Rga::new(id)),
            CrdtType::EnableWinsFlag => AnyCrdt::Flag(EnableWinsFlag::new(id)),
        }
    }

    /// Reconstruct a CRDT from a previously persisted/transmitted snapshot.
    pub fn from_snapshot(snapshot: &Map<String, Value>) -> CrdtResult<Self> {
        let tag = snapshot.get("type").and_then(Value::as_str).unwrap_or("");
        let crdt_type = CrdtType::parse(tag).ok_or_else(|| CrdtError::InvalidPayload {
            crdt_id: snapshot
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_owned(),
            operation: "from_snapshot".into(),
            reason: format!("unknown crdt type tag `{tag}`"),
        })?;
        Ok(match crdt_type {
            CrdtType::GCounter => AnyCrdt::GCounter(GCounter::from_snapshot(snapshot)?),
            CrdtType::PNCounter => AnyCrdt::PnCounter(PnCounter::from_snapshot(snapshot)?),
            CrdtType::GSet => AnyCrdt::GSet(GSet::from_snapshot(snapshot)?),
            CrdtType::ORSet => AnyCrdt::OrSet(OrSet::from_snapshot(snapshot)?),
            CrdtType::LWWRegister => AnyCrdt::LwwRegister(LwwRegister::from_snapshot(snapshot)?),
            CrdtType::MVRegister => AnyCrdt::MvRegister(MvRegister::from_snapshot(snapshot)?),
            CrdtType::LWWMap => AnyCrdt::LwwMap(LwwMap::from_snapshot(snapshot)?),
            CrdtType::ORMap => AnyCrdt::OrMap(OrMap::from_snapshot(snapshot)?),
            CrdtType::RGAArray => AnyCrdt::Rga(Rga::from_snapshot(snapshot)?),
            CrdtType::EnableWinsFlag => AnyCrdt::Flag(EnableWinsFlag::from_snapshot(snapshot)?),
        })
    }

    pub fn id(&self) -> &str {
        dispatch!(self, inner => inner.id())
    }

    pub fn crdt_type(&self) -> CrdtType {
        match self {
            AnyCrdt::GCounter(_) => CrdtType::GCounter,
            AnyCrdt::PnCounter(_) => CrdtType::PNCounter,
            AnyCrdt::GSet(_) => CrdtType::GSet,
            AnyCrdt::OrSet(_) => CrdtType::ORSet,
            AnyCrdt::LwwRegister(_) => CrdtType::LWWRegister,
            AnyCrdt::MvRegister(_) => CrdtType::MVRegister,
            AnyCrdt::LwwMap(_) => CrdtType::LWWMap,
            AnyCrdt::OrMap(_) => CrdtType::ORMap,
            AnyCrdt::Rga(_) => CrdtType::RGAArray,
            AnyCrdt::Flag(_) => CrdtType::EnableWinsFlag,
        }
    }

    pub fn apply_op(&mut self, op: &Operation) -> CrdtResult<()> {
        dispatch!(self, inner => inner.apply_op(op))
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        dispatch!(self, inner => inner.snapshot())
    }

    pub fn merge(&mut self, other: &Map<String, Value>) -> CrdtResult<()> {
        dispatch!(self, inner => inner.merge(other))
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn reset(&mut self) {
        dispatch!(self, inner => inner.reset())
    }

    pub fn validate(&self) -> CrdtResult<()> {
        dispatch!(self, inner => inner.validate())
    }

    pub fn create_op(
        &self,
        name: &str,
        data: Map<String, Value>,
        origin: &str,
        timestamp: i64,
    ) -> CrdtResult<Operation> {
        dispatch!(self, inner => inner.create_op(name, data, origin, timestamp))
    }
}
