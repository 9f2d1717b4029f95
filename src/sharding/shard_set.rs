use super::{HashFn, Shard};
use crate::core::ShardId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable set of shards owned by a host, paired with the hash function used
/// to route series onto shards.
///
/// Built fresh for every topology change; clones share the underlying storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSet {
    shards: Arc<BTreeMap<ShardId, Shard>>,
    hash_fn: HashFn,
}

impl ShardSet {
    /// Creates a shard set and stamps each shard with the hash range it
    /// serves. Duplicate ids keep the last descriptor.
    pub fn new(shards: impl IntoIterator<Item = Shard>, hash_fn: HashFn) -> Self {
        let shards = shards
            .into_iter()
            .map(|s| (s.id(), s.with_hash_range(hash_fn.range_for(s.id()))))
            .collect();
        Self {
            shards: Arc::new(shards),
            hash_fn,
        }
    }

    /// Creates a shard set owning no shards.
    pub fn empty(hash_fn: HashFn) -> Self {
        Self {
            shards: Arc::new(BTreeMap::new()),
            hash_fn,
        }
    }

    /// Returns all shards ordered by id.
    pub fn all(&self) -> impl Iterator<Item = &Shard> {
        self.shards.values()
    }

    pub fn all_ids(&self) -> Vec<ShardId> {
        self.shards.keys().copied().collect()
    }

    pub fn shard(&self, id: ShardId) -> Option<&Shard> {
        self.shards.get(&id)
    }

    pub fn contains(&self, id: ShardId) -> bool {
        self.shards.contains_key(&id)
    }

    /// Returns the shard a series id routes to, whether or not it is owned.
    pub fn lookup(&self, series_id: &str) -> ShardId {
        self.hash_fn.shard_for(series_id)
    }

    pub fn hash_fn(&self) -> HashFn {
        self.hash_fn
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}
