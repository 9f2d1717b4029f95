use crate::core::ShardId;
use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// Inclusive range of 64-bit series hashes served by one shard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HashRange {
    pub start: u64,
    pub end: u64,
}

impl HashRange {
    pub fn contains(&self, hash: u64) -> bool {
        self.start <= hash && hash <= self.end
    }
}

/// Routes series ids onto the shard space.
///
/// Uses FNV-1a so every node computes the same shard for a series regardless
/// of process or platform. The 64-bit hash space is split into `num_shards`
/// contiguous ranges, one per shard. Two hash functions are equal when they
/// cover the same number of shards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HashFn {
    num_shards: u32,
}

impl HashFn {
    pub fn new(num_shards: u32) -> Self {
        Self { num_shards }
    }

    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    pub fn hash(&self, series_id: &str) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in series_id.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// Computes the shard for a series id.
    pub fn shard_for(&self, series_id: &str) -> ShardId {
        if self.num_shards == 0 {
            return 0;
        }
        ((self.hash(series_id) as u128 * self.num_shards as u128) >> 64) as ShardId
    }

    /// The hashes routed to `shard_id`, or `None` outside the shard space.
    pub fn range_for(&self, shard_id: ShardId) -> Option<HashRange> {
        if shard_id >= self.num_shards {
            return None;
        }
        let start = range_start(shard_id, self.num_shards);
        let end = if shard_id + 1 == self.num_shards {
            u64::MAX
        } else {
            range_start(shard_id + 1, self.num_shards) - 1
        };
        Some(HashRange { start, end })
    }
}

/// Smallest hash that `shard_for` maps to `shard_id`.
fn range_start(shard_id: ShardId, num_shards: u32) -> u64 {
    ((shard_id as u128) << 64).div_ceil(num_shards as u128) as u64
}
