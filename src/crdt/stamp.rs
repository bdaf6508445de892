//! The `(timestamp, replica id)` tie-break shared by LWW-Register and
//! LWW-Map (spec §4.6, §4.8, invariant 6): ties are broken by the greater
//! lexicographic replica id, deterministically.

/// Returns `true` if `(ts_a, replica_a)` outranks `(ts_b, replica_b)`.
pub fn outranks(ts_a: i64, replica_a: &str, ts_b: i64, replica_b: &str) -> bool {
    match ts_a.cmp(&ts_b) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => replica_a > replica_b,
    }
}
