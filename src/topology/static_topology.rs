use super::watch::MapSender;
use super::{MapWatch, Topology, TopologyInitializer, TopologyMap};
use crate::core::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// A topology fixed at construction. It never changes and cannot mark shards
/// available.
pub struct StaticTopology {
    tx: MapSender,
}

impl StaticTopology {
    pub fn new(map: TopologyMap) -> Self {
        let (tx, _) = watch::channel(Some(Arc::new(map)));
        Self { tx }
    }
}

impl Topology for StaticTopology {
    fn get(&self) -> Option<Arc<TopologyMap>> {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> Result<MapWatch> {
        Ok(MapWatch::new(self.tx.subscribe()))
    }
}

/// Initializes a [`StaticTopology`] from a fixed map.
#[derive(Debug, Clone)]
pub struct StaticInitializer {
    map: TopologyMap,
}

impl StaticInitializer {
    pub fn new(map: TopologyMap) -> Self {
        Self { map }
    }
}

#[async_trait]
impl TopologyInitializer for StaticInitializer {
    async fn init(&self) -> Result<Arc<dyn Topology>> {
        Ok(Arc::new(StaticTopology::new(self.map.clone())))
    }
}
