//! Replica-scoped clock and randomness, injected rather than read from
//! globals so tests can pin UIDs and timestamps.
//!
//! Mirrors `calimero-storage`'s `crate::env` module, which its test suite
//! leans on via `env::reset_for_testing()` throughout `src/tests/*.rs`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

static FORCED_MILLIS: AtomicI64 = AtomicI64::new(-1);

/// Current wall-clock time in milliseconds since the epoch.
///
/// When a test has called [`set_forced_millis`], that value is returned
/// instead, so tag/UID generation and LWW timestamps become deterministic.
pub fn time_now_millis() -> i64 {
    let forced = FORCED_MILLIS.load(Ordering::Relaxed);
    if forced >= 0 {
        return forced;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// Pin the clock returned by [`time_now_millis`] for the remainder of the
/// process (test-only escape hatch).
pub fn set_forced_millis(millis: i64) {
    FORCED_MILLIS.store(millis, Ordering::Relaxed);
}

/// Release a previously forced clock, reverting to the wall clock.
pub fn reset_for_testing() {
    FORCED_MILLIS.store(-1, Ordering::Relaxed);
}

/// A 6-digit random suffix used by OR-Set tags and RGA UIDs. Not
/// cryptographically meaningful — only needs to make tags generated by the
/// same replica in the same millisecond distinct.
pub fn random_suffix() -> u32 {
    rand::thread_rng().gen_range(0..1_000_000)
}

/// Build a `"<replica>_<epoch-ms>_<6-digit random>"` identifier, used for
/// OR-Set tags and RGA UIDs.
pub fn generate_id(replica_id: &str, millis: i64) -> String {
    format!("{replica_id}_{millis}_{:06}", random_suffix())
}
