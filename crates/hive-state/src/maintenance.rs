//! Pipeline maintenance
//!
//! Content moves `files -> verified -> safe`, or ends in `discard`. A value
//! that reached a later stage is removed from the earlier ones.

use hive_core::{BucketPath, HiveResult};
use hive_time::SharedClock;

use crate::BucketStore;

/// Root buckets every node creates at startup
pub const SWARM_BUCKETS: [&str; 8] = [
    "networks", "peer", "share", "files", "verified", "safe", "discard", "private",
];

/// `(later, earlier)`: every value in `later` is swept out of `earlier`
pub const PROGRESSION: [(&str, &str); 5] = [
    ("verified", "files"),
    ("discard", "verified"),
    ("discard", "files"),
    ("safe", "verified"),
    ("safe", "files"),
];

/// Store with the standard swarm buckets in place
pub fn swarm_store(clock: SharedClock) -> HiveResult<BucketStore> {
    let mut store = BucketStore::new(clock);
    init_swarm_buckets(&mut store)?;
    Ok(store)
}

pub fn init_swarm_buckets(store: &mut BucketStore) -> HiveResult<()> {
    for name in SWARM_BUCKETS {
        store.init_bucket(&BucketPath::new([name]))?;
    }
    Ok(())
}

/// Remove from each earlier stage every live value of its later stage.
/// Returns the number of entries removed; a second sweep removes nothing.
pub fn maintenance_sweep(store: &mut BucketStore) -> usize {
    let mut removed = 0;
    for (later, earlier) in PROGRESSION {
        let earlier = BucketPath::new([earlier]);
        for value in store.query(&BucketPath::new([later])) {
            if store.remove(&earlier, &value) {
                removed += 1;
            }
        }
    }
    if removed > 0 {
        tracing::debug!(removed, "maintenance sweep");
    }
    removed
}
