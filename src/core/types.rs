/// Identifier of a shard within the cluster-wide shard space.
pub type ShardId = u32;
