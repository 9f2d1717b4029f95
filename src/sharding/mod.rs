//! Shard descriptors and host shard sets.

pub mod shard;
pub mod shard_hash;
pub mod shard_set;

pub use shard::{Shard, ShardState};
pub use shard_hash::{HashFn, HashRange};
pub use shard_set::ShardSet;
