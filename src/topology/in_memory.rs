use super::watch::MapSender;
use super::{DynamicTopology, MapWatch, Topology, TopologyInitializer, TopologyMap};
use crate::core::{DbError, Result, ShardId};
use crate::sharding::ShardState;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{Level, event};

#[derive(Default)]
struct DynamicState {
    mark_calls: Vec<(String, ShardId)>,
    failing_shards: HashSet<ShardId>,
}

/// A mutable topology held in process memory.
///
/// Every mutation publishes a new snapshot to all watchers. Used for
/// single-process clusters and for exercising cluster members in tests.
pub struct InMemoryDynamicTopology {
    tx: MapSender,
    state: Mutex<DynamicState>,
}

impl InMemoryDynamicTopology {
    /// Creates a topology that is immediately ready with `map`.
    pub fn new(map: TopologyMap) -> Self {
        let (tx, _) = watch::channel(Some(Arc::new(map)));
        Self {
            tx,
            state: Mutex::new(DynamicState::default()),
        }
    }

    /// Creates a topology with no snapshot; watchers wait until the first
    /// [`publish`](Self::publish).
    pub fn unready() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            state: Mutex::new(DynamicState::default()),
        }
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, map: TopologyMap) -> Result<()> {
        let _state = self.state.lock()?;
        self.tx.send_replace(Some(Arc::new(map)));
        Ok(())
    }

    /// Every `(host_id, shard_id)` passed to `mark_shard_available`, in call
    /// order, including rejected calls.
    pub fn mark_calls(&self) -> Result<Vec<(String, ShardId)>> {
        Ok(self.state.lock()?.mark_calls.clone())
    }

    /// Makes subsequent promotions of `shard_id` fail.
    pub fn fail_mark_for(&self, shard_id: ShardId) -> Result<()> {
        self.state.lock()?.failing_shards.insert(shard_id);
        Ok(())
    }

    pub fn clear_failures(&self) -> Result<()> {
        self.state.lock()?.failing_shards.clear();
        Ok(())
    }
}

impl Topology for InMemoryDynamicTopology {
    fn get(&self) -> Option<Arc<TopologyMap>> {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> Result<MapWatch> {
        Ok(MapWatch::new(self.tx.subscribe()))
    }

    fn as_dynamic(&self) -> Option<&dyn DynamicTopology> {
        Some(self)
    }
}

#[async_trait]
impl DynamicTopology for InMemoryDynamicTopology {
    async fn mark_shard_available(&self, host_id: &str, shard_id: ShardId) -> Result<()> {
        let mut state = self.state.lock()?;
        state.mark_calls.push((host_id.to_string(), shard_id));
        if state.failing_shards.contains(&shard_id) {
            return Err(DbError::ExecutionError(format!(
                "mark shard {} available rejected by topology store",
                shard_id
            )));
        }

        let current = self.tx.borrow().clone().ok_or_else(|| {
            DbError::TopologyWatch("topology has no snapshot yet".to_string())
        })?;
        let next = current.with_shard_state(host_id, shard_id, ShardState::Available)?;
        event!(
            Level::DEBUG,
            host_id = %host_id,
            shard_id,
            version = next.version(),
            "topology shard marked available"
        );
        self.tx.send_replace(Some(Arc::new(next)));
        Ok(())
    }
}

/// Hands out a shared [`InMemoryDynamicTopology`].
#[derive(Clone)]
pub struct DynamicInitializer {
    topology: Arc<InMemoryDynamicTopology>,
}

impl DynamicInitializer {
    pub fn new(topology: Arc<InMemoryDynamicTopology>) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl TopologyInitializer for DynamicInitializer {
    async fn init(&self) -> Result<Arc<dyn Topology>> {
        Ok(self.topology.clone())
    }
}
