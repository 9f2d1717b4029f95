use super::{MapWatch, TopologyMap};
use crate::core::{Result, ShardId};
use async_trait::async_trait;
use std::sync::Arc;

/// Read side of a cluster topology.
pub trait Topology: Send + Sync {
    /// Latest snapshot, or `None` before the topology is ready.
    fn get(&self) -> Option<Arc<TopologyMap>>;

    /// Subscribes to snapshot changes.
    fn watch(&self) -> Result<MapWatch>;

    /// Capability query for topologies that accept shard state mutations.
    fn as_dynamic(&self) -> Option<&dyn DynamicTopology> {
        None
    }
}

/// A topology whose shard states can be advanced by cluster members.
#[async_trait]
pub trait DynamicTopology: Topology {
    /// Requests that `shard_id` on `host_id` be marked available cluster-wide.
    async fn mark_shard_available(&self, host_id: &str, shard_id: ShardId) -> Result<()>;
}

/// Produces a ready-to-watch topology.
#[async_trait]
pub trait TopologyInitializer: Send + Sync {
    async fn init(&self) -> Result<Arc<dyn Topology>>;
}
