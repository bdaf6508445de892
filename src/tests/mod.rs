//! Property-based invariants and worked end-to-end scenarios, exercised
//! directly against the CRDT variants (the manager has its own test module
//! in `manager.rs`). Replica ids follow an `a < b < c` lexicographic
//! convention throughout.

use serde_json::{json, Map, Value};

use crate::crdt::any::{AnyCrdt, CrdtType};
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
use crate::error::CrdtError;
use crate::op::Operation;

fn data(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn op(crdt_id: &str, name: &str, node_id: &str, ts: i64, pairs: &[(&str, Value)]) -> Operation {
    Operation::new(crdt_id, name, data(pairs), node_id, ts)
}

// ---------------------------------------------------------------------
// §8.1-3: idempotence, commutativity, associativity, generically over
// any CRDT variant via the snapshot/merge surface.
// ---------------------------------------------------------------------

fn assert_semilattice_laws(build: impl Fn() -> AnyCrdt) {
    // Idempotence: merge(a, snapshot(a)) == a.
    let mut a = build();
    let snap_a = a.snapshot();
    a.merge(&snap_a).unwrap();
    assert_eq!(a.snapshot(), snap_a, "merge(a, snapshot(a)) must equal a");

    // Commutativity / associativity are exercised per-variant below with
    // real divergent operation histories (a generic fixture with no
    // operations would trivially satisfy both).
    let _ = a;
}

#[test]
fn idempotence_holds_for_every_variant() {
    for crdt_type in [
        CrdtType::GCounter,
        CrdtType::PNCounter,
        CrdtType::GSet,
        CrdtType::ORSet,
        CrdtType::LWWRegister,
        CrdtType::MVRegister,
        CrdtType::LWWMap,
        CrdtType::ORMap,
        CrdtType::RGAArray,
        CrdtType::EnableWinsFlag,
    ] {
        assert_semilattice_laws(|| AnyCrdt::new("x", crdt_type));
    }
}

/// Builds three divergent `GCounter` replicas and checks commutativity and
/// associativity of `merge` over all orderings.
#[test]
fn g_counter_merge_is_commutative_and_associative() {
    let mut a = GCounter::new("c");
    a.apply_op(&op("c", "increment", "a", 1, &[("amount", json!(3))]))
        .unwrap();
    let mut b = GCounter::new("c");
    b.apply_op(&op("c", "increment", "b", 1, &[("amount", json!(4))]))
        .unwrap();
    let mut cc = GCounter::new("c");
    cc.apply_op(&op("c", "increment", "c", 1, &[("amount", json!(5))]))
        .unwrap();

    let mut ab = a.clone();
    ab.merge(&b.snapshot()).unwrap();
    let mut ba = b.clone();
    ba.merge(&a.snapshot()).unwrap();
    assert_eq!(ab, ba, "merge must commute");

    let mut left = a.clone();
    left.merge(&b.snapshot()).unwrap();
    left.merge(&cc.snapshot()).unwrap();
    let mut right = a.clone();
    let mut bc = b.clone();
    bc.merge(&cc.snapshot()).unwrap();
    right.merge(&bc.snapshot()).unwrap();
    assert_eq!(left, right, "merge must associate");
}

/// Spec §8 concrete scenario: G-Counter merge.
#[test]
fn scenario_g_counter_merge() {
    let mut a = GCounter::new("c");
    a.apply_op(&op("c", "increment", "a", 1, &[("amount", json!(3))]))
        .unwrap();
    let mut b = GCounter::new("c");
    b.apply_op(&op("c", "increment", "b", 1, &[("amount", json!(4))]))
        .unwrap();

    let mut merged_ab = a.clone();
    merged_ab.merge(&b.snapshot()).unwrap();
    let mut merged_ba = b.clone();
    merged_ba.merge(&a.snapshot()).unwrap();

    assert_eq!(merged_ab.value(), 7);
    assert_eq!(merged_ba.value(), 7);
    assert_eq!(merged_ab.counts().get("a"), Some(&3));
    assert_eq!(merged_ab.counts().get("b"), Some(&4));
}

/// Spec §2 invariant 2 / §8.5: per-replica counts never decrease across
/// operations or merges.
#[test]
fn g_counter_counts_are_monotone() {
    let mut a = GCounter::new("c");
    a.apply_op(&op("c", "increment", "a", 1, &[("amount", json!(2))]))
        .unwrap();
    let before = a.value();
    let mut b = GCounter::new("c");
    b.apply_op(&op("c", "increment", "b", 1, &[("amount", json!(1))]))
        .unwrap();
    a.merge(&b.snapshot()).unwrap();
    assert!(a.value() >= before);
}

/// Negative amounts are rejected.
#[test]
fn g_counter_rejects_negative_amount() {
    let mut a = GCounter::new("c");
    let err = a
        .apply_op(&op("c", "increment", "a", 1, &[("amount", json!(-1))]))
        .unwrap_err();
    assert!(matches!(err, CrdtError::InvalidPayload { .. }));
}

/// Zero amount is a no-op; amount defaults to 1 when absent.
#[test]
fn g_counter_zero_is_noop_and_amount_defaults_to_one() {
    let mut a = GCounter::new("c");
    a.apply_op(&op("c", "increment", "a", 1, &[("amount", json!(0))]))
        .unwrap();
    assert_eq!(a.value(), 0);
    a.apply_op(&op("c", "increment", "a", 1, &[])).unwrap();
    assert_eq!(a.value(), 1);
}

/// Spec §8 concrete scenario: PN-Counter convergence.
#[test]
fn scenario_pn_counter_convergence() {
    let mut a = PnCounter::new("c");
    a.apply_op(&op("c", "increment", "a", 1, &[("amount", json!(10))]))
        .unwrap();
    a.apply_op(&op("c", "decrement", "a", 2, &[("amount", json!(2))]))
        .unwrap();
    let mut b = PnCounter::new("c");
    b.apply_op(&op("c", "increment", "b", 1, &[("amount", json!(5))]))
        .unwrap();
    b.apply_op(&op("c", "decrement", "b", 2, &[("amount", json!(8))]))
        .unwrap();

    a.merge(&b.snapshot()).unwrap();
    b.merge(&a.snapshot()).unwrap();
    assert_eq!(a.value(), 5);
    assert_eq!(b.value(), 5);
    let total_p: u64 = a.positive().values().sum();
    let total_n: u64 = a.negative().values().sum();
    assert_eq!(total_p, 15);
    assert_eq!(total_n, 10);
}

#[test]
fn pn_counter_rejects_non_positive_amounts() {
    let mut a = PnCounter::new("c");
    assert!(matches!(
        a.apply_op(&op("c", "increment", "a", 1, &[("amount", json!(0))]))
            .unwrap_err(),
        CrdtError::InvalidPayload { .. }
    ));
    assert!(matches!(
        a.apply_op(&op("c", "decrement", "a", 1, &[("amount", json!(-3))]))
            .unwrap_err(),
        CrdtError::InvalidPayload { .. }
    ));
}

#[test]
fn g_set_merge_is_union() {
    let mut a = GSet::new("s");
    a.apply_op(&op("s", "add", "a", 1, &[("element", json!("x"))]))
        .unwrap();
    let mut b = GSet::new("s");
    b.apply_op(&op(
        "s",
        "addAll",
        "b",
        1,
        &[("elements", json!(["y", "z"]))],
    ))
    .unwrap();
    a.merge(&b.snapshot()).unwrap();
    assert_eq!(
        a.value().iter().cloned().collect::<Vec<_>>(),
        vec!["x".to_owned(), "y".to_owned(), "z".to_owned()]
    );
}

/// Spec §8 concrete scenario: OR-Set concurrent add/remove (property 6).
#[test]
fn scenario_or_set_concurrent_add_remove_survives() {
    let mut a = OrSet::new("s");
    a.apply_op(&op(
        "s",
        "add",
        "a",
        1,
        &[("element", json!("apple")), ("tag", json!("a_1_000001"))],
    ))
    .unwrap();
    let mut b = OrSet::new("s");
    b.apply_op(&op(
        "s",
        "add",
        "b",
        1,
        &[("element", json!("apple")), ("tag", json!("b_1_000002"))],
    ))
    .unwrap();

    // a removes only the tag it observed (its own add), never having seen
    // b's concurrent add.
    a.apply_op(&op("s", "remove", "a", 2, &[("element", json!("apple"))]))
        .unwrap();

    a.merge(&b.snapshot()).unwrap();
    assert!(a.value().contains("apple"));
    a.validate().unwrap();
}

#[test]
fn or_set_remove_by_explicit_tag_only_retires_that_tag() {
    let mut a = OrSet::new("s");
    a.apply_op(&op(
        "s",
        "add",
        "a",
        1,
        &[("element", json!("apple")), ("tag", json!("t1"))],
    ))
    .unwrap();
    a.apply_op(&op(
        "s",
        "add",
        "a",
        1,
        &[("element", json!("apple")), ("tag", json!("t2"))],
    ))
    .unwrap();
    a.apply_op(&op(
        "s",
        "remove",
        "a",
        2,
        &[("element", json!("apple")), ("tag", json!("t1"))],
    ))
    .unwrap();
    assert!(a.value().contains("apple"));
    a.validate().unwrap();
}

/// Spec §8 concrete scenario: LWW-Register tie-break.
#[test]
fn scenario_lww_register_tie_break() {
    let mut a = LwwRegister::new("r");
    a.apply_op(&op(
        "r",
        "set",
        "a",
        1000,
        &[("value", json!("first")), ("timestamp", json!(1000))],
    ))
    .unwrap();
    let mut b = LwwRegister::new("r");
    b.apply_op(&op(
        "r",
        "set",
        "b",
        1000,
        &[("value", json!("second")), ("timestamp", json!(1000))],
    ))
    .unwrap();

    a.merge(&b.snapshot()).unwrap();
    assert_eq!(a.value(), Some(&json!("second")));

    b.merge(&LwwRegister::new("r").snapshot()).unwrap();
    assert_eq!(b.value(), Some(&json!("second")));
}

#[test]
fn lww_register_round_trips_through_snapshot() {
    let mut a = LwwRegister::new("r");
    a.apply_op(&op("r", "set", "a", 5, &[("value", json!(42))]))
        .unwrap();
    let restored = LwwRegister::from_snapshot(&a.snapshot()).unwrap();
    assert_eq!(restored, a);
}

/// Spec §8 property 8: MV-Register residual set never contains a
/// dominated clock.
#[test]
fn mv_register_residual_set_is_an_antichain() {
    use crate::crdt::mv_register::VectorClock;

    let mut a = MvRegister::new("m");
    let clock_a: VectorClock = [("a".to_owned(), 1)].into_iter().collect();
    a.apply_op(&op(
        "m",
        "set",
        "a",
        1,
        &[("value", json!("x")), ("vectorClock", json!({"a": 1}))],
    ))
    .unwrap();

    let mut b = MvRegister::new("m");
    let clock_b: VectorClock = [("b".to_owned(), 1)].into_iter().collect();
    b.apply_op(&op(
        "m",
        "set",
        "b",
        1,
        &[("value", json!("y")), ("vectorClock", json!({"b": 1}))],
    ))
    .unwrap();

    a.merge(&b.snapshot()).unwrap();
    // concurrent: both values survive.
    assert_eq!(a.values().len(), 2);
    a.validate().unwrap();

    // a value with a clock that dominates both collapses the set to one.
    let mut dominating = clock_a.clone();
    for (k, v) in &clock_b {
        dominating.insert(k.clone(), *v);
    }
    *dominating.entry("a".to_owned()).or_insert(0) += 1;
    a.apply_op(&op(
        "m",
        "set",
        "a",
        2,
        &[
            ("value", json!("z")),
            ("vectorClock", json!(dominating)),
        ],
    ))
    .unwrap();
    assert_eq!(a.values().len(), 1);
    a.validate().unwrap();
}

#[test]
fn mv_register_resolve_produces_a_dominating_clock() {
    let mut a = MvRegister::new("m");
    a.apply_op(&op(
        "m",
        "set",
        "a",
        1,
        &[("value", json!("x")), ("vectorClock", json!({"a": 1}))],
    ))
    .unwrap();
    a.apply_op(&op(
        "m",
        "set",
        "b",
        1,
        &[("value", json!("y")), ("vectorClock", json!({"b": 1}))],
    ))
    .unwrap();
    assert_eq!(a.values().len(), 2);

    let (value, clock) = a.resolve("c", |_entries| 0).unwrap();
    assert_eq!(value, json!("x"));
    assert_eq!(clock.get("a"), Some(&1));
    assert_eq!(clock.get("b"), Some(&1));
    assert_eq!(clock.get("c"), Some(&1));
}

/// Spec §8 concrete scenario: RGA concurrent insert at position 0. Two
/// replicas starting from empty both insert a single character at index
/// 0; after merge both converge on the same order (by UID, not insertion
/// time), and the one with the lexicographically smaller UID sorts first.
#[test]
fn scenario_rga_concurrent_insert_at_zero_converges() {
    let mut a = Rga::new("seq");
    a.apply_op(&op(
        "seq",
        "insert",
        "a",
        1000,
        &[
            ("index", json!(0)),
            ("element", json!("X")),
            ("uid", json!("a_1000_000001")),
        ],
    ))
    .unwrap();
    let mut b = Rga::new("seq");
    b.apply_op(&op(
        "seq",
        "insert",
        "b",
        1000,
        &[
            ("index", json!(0)),
            ("element", json!("Y")),
            ("uid", json!("b_1000_000002")),
        ],
    ))
    .unwrap();

    let mut merged_ab = a.clone();
    merged_ab.merge(&b.snapshot()).unwrap();
    let mut merged_ba = b.clone();
    merged_ba.merge(&a.snapshot()).unwrap();

    assert_eq!(merged_ab.visible(), merged_ba.visible());
    assert_eq!(merged_ab.visible(), vec![&json!("X"), &json!("Y")]);
}

#[test]
fn rga_delete_by_index_and_by_uid_are_equivalent() {
    let mut a = Rga::new("seq");
    a.insert_text(0, "abc", "a", 1).unwrap();
    let mut b = a.clone();

    a.apply_op(&op("seq", "delete", "a", 2, &[("index", json!(1))]))
        .unwrap();
    assert_eq!(a.get_text().unwrap(), "ac");

    b.delete_range(1, 2).unwrap();
    assert_eq!(b.get_text().unwrap(), "ac");
}

/// §4.10: a single replica's own sequential inserts must keep their
/// insertion order even when they share a replica id and millisecond
/// timestamp (as every character of one `insertText` call does) — the
/// §9.1 open question only sanctions cross-replica interleaving, not a
/// same-replica UID tie-break scrambling its own text.
#[test]
fn rga_insert_text_preserves_order_within_one_millisecond() {
    let mut a = Rga::new("seq");
    a.insert_text(0, "hello world", "a", 1).unwrap();
    assert_eq!(a.get_text().unwrap(), "hello world");

    // Every generated UID shares the same `<replica>_<ms>_` prefix, so this
    // only holds if the trailing counter is monotonic, not random.
    let uids: Vec<Value> = a.snapshot()["elements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["uid"].clone())
        .collect();
    let mut sorted = uids.clone();
    sorted.sort_by(|x, y| x.as_str().cmp(&y.as_str()));
    assert_eq!(uids, sorted, "uids must already be in ascending insertion order");
}

#[test]
fn rga_insert_out_of_bounds_is_rejected() {
    let mut a = Rga::new("seq");
    let err = a
        .apply_op(&op(
            "seq",
            "insert",
            "a",
            1,
            &[("index", json!(5)), ("element", json!("x"))],
        ))
        .unwrap_err();
    assert!(matches!(err, CrdtError::OutOfRange { .. }));
}

/// Spec §8 property 9: convergence under merge regardless of delivery
/// order of a small operation log.
#[test]
fn rga_converges_for_any_merge_order() {
    let mut origin = Rga::new("seq");
    origin.insert_text(0, "hello", "a", 1).unwrap();

    let mut via_a_then_b = Rga::new("seq");
    via_a_then_b.merge(&origin.snapshot()).unwrap();
    let mut via_b_then_a = Rga::new("seq");
    via_b_then_a.merge(&origin.snapshot()).unwrap();

    assert_eq!(via_a_then_b.get_text().unwrap(), "hello");
    assert_eq!(via_b_then_a.get_text().unwrap(), "hello");
}

/// Spec §8 concrete scenario: Enable-Wins.
#[test]
fn scenario_enable_wins() {
    let mut a = EnableWinsFlag::new("f");
    a.apply_op(&op("f", "enable", "a", 1, &[])).unwrap();
    let mut b = EnableWinsFlag::new("f");
    b.apply_op(&op("f", "disable", "b", 1, &[])).unwrap();

    let mut merged_ab = a.clone();
    merged_ab.merge(&b.snapshot()).unwrap();
    let mut merged_ba = b.clone();
    merged_ba.merge(&a.snapshot()).unwrap();

    assert!(merged_ab.value());
    assert!(merged_ba.value());
}

/// Spec §8 property 4: merging a snapshot whose `type` or `id` differs
/// raises `StateTypeMismatch`.
#[test]
fn merge_with_mismatched_type_or_id_is_rejected() {
    let mut a = GCounter::new("c1");
    let wrong_id = GCounter::new("c2").snapshot();
    assert!(matches!(
        a.merge(&wrong_id).unwrap_err(),
        CrdtError::StateTypeMismatch { .. }
    ));

    let mut flag_snapshot = EnableWinsFlag::new("c1").snapshot();
    flag_snapshot.insert("id".into(), json!("c1"));
    assert!(matches!(
        a.merge(&flag_snapshot).unwrap_err(),
        CrdtError::StateTypeMismatch { .. }
    ));
}

/// Round-trip law: `from_snapshot(snapshot(c)) == c` after a sequence of
/// operations, for every variant.
#[test]
fn round_trip_law_holds_after_operations() {
    let mut g = GCounter::new("g");
    g.apply_op(&op("g", "increment", "a", 1, &[("amount", json!(2))]))
        .unwrap();
    assert_eq!(GCounter::from_snapshot(&g.snapshot()).unwrap(), g);

    let mut pn = PnCounter::new("pn");
    pn.apply_op(&op("pn", "increment", "a", 1, &[("amount", json!(3))]))
        .unwrap();
    pn.apply_op(&op("pn", "decrement", "a", 2, &[("amount", json!(1))]))
        .unwrap();
    assert_eq!(PnCounter::from_snapshot(&pn.snapshot()).unwrap(), pn);

    let mut set = OrSet::new("s");
    set.apply_op(&op(
        "s",
        "add",
        "a",
        1,
        &[("element", json!("x")), ("tag", json!("t1"))],
    ))
    .unwrap();
    assert_eq!(OrSet::from_snapshot(&set.snapshot()).unwrap(), set);

    let mut seq = Rga::new("seq");
    seq.insert_text(0, "hi", "a", 1).unwrap();
    assert_eq!(Rga::from_snapshot(&seq.snapshot()).unwrap(), seq);

    let mut flag = EnableWinsFlag::new("f");
    flag.apply_op(&op("f", "enable", "a", 1, &[])).unwrap();
    assert_eq!(EnableWinsFlag::from_snapshot(&flag.snapshot()).unwrap(), flag);
}

// ---------------------------------------------------------------------
// LWW-Map (spec §4.8)
// ---------------------------------------------------------------------

/// Spec §8 property 7: on equal timestamps the greater replica id wins,
/// for the map as well as the register.
#[test]
fn scenario_lww_map_tie_break() {
    let mut a = LwwMap::new("m");
    a.apply_op(&op(
        "m",
        "put",
        "a",
        1000,
        &[("key", json!("k")), ("value", json!("first")), ("timestamp", json!(1000))],
    ))
    .unwrap();
    let mut b = LwwMap::new("m");
    b.apply_op(&op(
        "m",
        "put",
        "b",
        1000,
        &[("key", json!("k")), ("value", json!("second")), ("timestamp", json!(1000))],
    ))
    .unwrap();

    a.merge(&b.snapshot()).unwrap();
    assert_eq!(a.get("k"), Some(&json!("second")));

    b.merge(&LwwMap::new("m").snapshot()).unwrap();
    assert_eq!(b.get("k"), Some(&json!("second")));
}

/// A remove that doesn't outrank the add-stamp leaves the key present; one
/// that does retires it. `clear` removes every currently-present key.
#[test]
fn lww_map_put_remove_and_clear() {
    let mut m = LwwMap::new("m");
    m.apply_op(&op("m", "put", "a", 10, &[("key", json!("x")), ("value", json!(1))]))
        .unwrap();
    m.apply_op(&op("m", "put", "a", 10, &[("key", json!("y")), ("value", json!(2))]))
        .unwrap();
    // A remove stamped before the put does not retire it.
    m.apply_op(&op("m", "remove", "a", 5, &[("key", json!("x"))]))
        .unwrap();
    assert_eq!(m.get("x"), Some(&json!(1)));

    // A later remove does.
    m.apply_op(&op("m", "remove", "a", 20, &[("key", json!("x"))]))
        .unwrap();
    assert_eq!(m.get("x"), None);

    m.apply_op(&op("m", "clear", "a", 30, &[])).unwrap();
    assert_eq!(m.get("y"), None);
}

/// Spec §9.4 open-question decision: an add-stamp equal to the
/// remove-stamp (same timestamp, same replica) leaves the key absent.
#[test]
fn lww_map_equal_add_and_remove_stamp_is_absent() {
    let mut m = LwwMap::new("m");
    m.apply_op(&op("m", "put", "a", 10, &[("key", json!("x")), ("value", json!(1))]))
        .unwrap();
    m.apply_op(&op("m", "remove", "a", 10, &[("key", json!("x"))]))
        .unwrap();
    assert_eq!(m.get("x"), None);
}

#[test]
fn lww_map_round_trips_through_snapshot() {
    let mut m = LwwMap::new("m");
    m.apply_op(&op("m", "put", "a", 1, &[("key", json!("x")), ("value", json!(7))]))
        .unwrap();
    let restored = LwwMap::from_snapshot(&m.snapshot()).unwrap();
    assert_eq!(restored, m);
}

// ---------------------------------------------------------------------
// OR-Map (spec §4.9)
// ---------------------------------------------------------------------

fn counter_factory() -> crate::crdt::any::CrdtFactory {
    std::sync::Arc::new(|id: &str, crdt_type: CrdtType| AnyCrdt::new(id, crdt_type))
}

/// A key's inner CRDT is recursively merged when both replicas already
/// know about it.
#[test]
fn or_map_add_and_update_value_merges_inner_crdt() {
    let mut a = OrMap::new("m").with_factory(counter_factory());
    a.apply_op(&op(
        "m",
        "add",
        "a",
        1,
        &[
            ("key", json!("counter")),
            ("crdtType", json!("GCounter")),
            ("crdtId", json!("counter")),
            ("tag", json!("t1")),
        ],
    ))
    .unwrap();
    let mut inner_op = Map::new();
    inner_op.insert("operation".into(), json!("increment"));
    inner_op.insert("data".into(), json!({"amount": 3}));
    a.apply_op(&op(
        "m",
        "updateValue",
        "a",
        2,
        &[("key", json!("counter")), ("valueOperation", Value::Object(inner_op))],
    ))
    .unwrap();

    let mut b = OrMap::new("m").with_factory(counter_factory());
    b.apply_op(&op(
        "m",
        "add",
        "b",
        1,
        &[
            ("key", json!("counter")),
            ("crdtType", json!("GCounter")),
            ("crdtId", json!("counter")),
            ("tag", json!("t2")),
        ],
    ))
    .unwrap();
    let mut inner_op_b = Map::new();
    inner_op_b.insert("operation".into(), json!("increment"));
    inner_op_b.insert("data".into(), json!({"amount": 4}));
    b.apply_op(&op(
        "m",
        "updateValue",
        "b",
        2,
        &[("key", json!("counter")), ("valueOperation", Value::Object(inner_op_b))],
    ))
    .unwrap();

    a.merge(&b.snapshot()).unwrap();
    assert!(a.keys().contains("counter"));
    match a.get("counter").unwrap() {
        AnyCrdt::GCounter(g) => assert_eq!(g.value(), 7),
        _ => panic!("expected a g-counter"),
    }
    a.validate().unwrap();
}

/// Without a factory, a remote key's tags still merge (so the key becomes
/// visible) even though its inner value can't be materialised locally
/// (spec §9.3 open-question decision).
#[test]
fn or_map_merge_without_factory_still_merges_tags() {
    let mut a = OrMap::new("m");
    let mut b = OrMap::new("m").with_factory(counter_factory());
    b.apply_op(&op(
        "m",
        "add",
        "b",
        1,
        &[
            ("key", json!("counter")),
            ("crdtType", json!("GCounter")),
            ("crdtId", json!("counter")),
            ("tag", json!("t1")),
        ],
    ))
    .unwrap();

    a.merge(&b.snapshot()).unwrap();
    assert!(a.keys().contains("counter"));
    assert!(a.get_mut("counter").is_none());
}

/// OR-Map `add` with no factory configured fails with `FactoryMissing`.
#[test]
fn or_map_add_without_factory_fails() {
    let mut m = OrMap::new("m");
    let err = m
        .apply_op(&op(
            "m",
            "add",
            "a",
            1,
            &[
                ("key", json!("counter")),
                ("crdtType", json!("GCounter")),
                ("crdtId", json!("counter")),
            ],
        ))
        .unwrap_err();
    assert!(matches!(err, CrdtError::FactoryMissing(_)));
}

/// A concurrent remove that didn't observe a tag never erases it
/// (observed-remove semantics, same as OR-Set).
#[test]
fn or_map_concurrent_add_remove_survives() {
    let factory = counter_factory();
    let mut a = OrMap::new("m").with_factory(factory.clone());
    a.apply_op(&op(
        "m",
        "add",
        "a",
        1,
        &[
            ("key", json!("k")),
            ("crdtType", json!("GCounter")),
            ("crdtId", json!("k")),
            ("tag", json!("t1")),
        ],
    ))
    .unwrap();
    let mut b = OrMap::new("m").with_factory(factory);
    b.apply_op(&op(
        "m",
        "add",
        "b",
        1,
        &[
            ("key", json!("k")),
            ("crdtType", json!("GCounter")),
            ("crdtId", json!("k")),
            ("tag", json!("t2")),
        ],
    ))
    .unwrap();
    a.apply_op(&op("m", "remove", "a", 2, &[("key", json!("k"))]))
        .unwrap();

    a.merge(&b.snapshot()).unwrap();
    assert!(a.keys().contains("k"));
    a.validate().unwrap();
}
