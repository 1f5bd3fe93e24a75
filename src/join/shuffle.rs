//! Hash routing shared by both sides of the join.
//!
//! Rows and lookup results are routed with the same function, so everything
//! sharing a join key meets in the same shard regardless of how many shards
//! there are or which worker produced it.

use crate::data::JoinKey;
use crate::hash::stable_hash_key;

/// Shard index for `key` among `partitions` shards.
///
/// `partitions == 0` is treated as `1`.
pub fn shard_of(seed: u64, key: &JoinKey, partitions: usize) -> usize {
    let partitions = partitions.max(1) as u64;
    (stable_hash_key(seed, key) % partitions) as usize
}

/// Split `items` into `partitions` shards by the shard of `key(item)`.
///
/// Relative order inside a shard follows input order.
pub fn route_by_key<T, F>(items: Vec<T>, seed: u64, partitions: usize, key: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> JoinKey,
{
    let partitions = partitions.max(1);
    let mut shards: Vec<Vec<T>> = (0..partitions).map(|_| Vec::new()).collect();
    for item in items {
        let shard = shard_of(seed, &key(&item), partitions);
        shards[shard].push(item);
    }
    shards
}
