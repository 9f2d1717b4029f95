use crate::cluster::{TopologyWatcher, host_or_empty_shard_set};
use crate::core::Result;
use crate::sharding::ShardSet;
use crate::storage::{
    Database, Datapoint, DatabaseOptions, InMemoryDatabase, Namespace, NamespaceMetadata,
    NewDatabaseFn,
};
use crate::topology::{MapWatch, Topology, TopologyInitializer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, event};

/// A storage engine kept in sync with the cluster topology.
///
/// Behaves exactly like the wrapped engine except for `open` and `close`,
/// which start and stop the background topology watch. While watching, the
/// engine's shard set follows every topology change and initializing shards
/// that finished bootstrapping in all namespaces are promoted to available.
pub struct ClusterDatabase<D> {
    host_id: String,
    topology: Arc<dyn Topology>,
    watch: Mutex<MapWatch>,
    database: Arc<D>,
    watcher: TopologyWatcher<D>,
}

impl ClusterDatabase<InMemoryDatabase> {
    /// Creates a clustered in-memory database.
    ///
    /// Blocks until the topology delivers its first snapshot.
    ///
    /// ```
    /// use clusterdb::{ClusterDatabase, Database, DatabaseOptions, NamespaceMetadata};
    /// use clusterdb::{Shard, StaticInitializer, TopologyMap};
    ///
    /// # tokio_test::block_on(async {
    /// let map = TopologyMap::builder(4)
    ///     .host("node-a", vec![Shard::new(0), Shard::new(1)])
    ///     .build()
    ///     .unwrap();
    /// let db = ClusterDatabase::new(
    ///     &[NamespaceMetadata::new("metrics")],
    ///     "node-a",
    ///     &StaticInitializer::new(map),
    ///     DatabaseOptions::default(),
    /// )
    /// .await
    /// .unwrap();
    /// assert_eq!(db.shard_set().all_ids(), vec![0, 1]);
    /// # });
    /// ```
    pub async fn new(
        namespaces: &[NamespaceMetadata],
        host_id: impl Into<String>,
        topology_init: &dyn TopologyInitializer,
        options: DatabaseOptions,
    ) -> Result<Self> {
        Self::new_with_constructor(
            namespaces,
            host_id,
            topology_init,
            options,
            Box::new(InMemoryDatabase::new),
        )
        .await
    }
}

impl<D: Database + 'static> ClusterDatabase<D> {
    /// Creates a cluster database around the engine built by `new_database`.
    pub async fn new_with_constructor(
        namespaces: &[NamespaceMetadata],
        host_id: impl Into<String>,
        topology_init: &dyn TopologyInitializer,
        options: DatabaseOptions,
        new_database: NewDatabaseFn<D>,
    ) -> Result<Self> {
        options.validate()?;
        let host_id = host_id.into();

        let topology = topology_init.init().await?;
        let mut watch = topology.watch()?;
        let map = watch.wait_ready().await?;

        let shard_set = host_or_empty_shard_set(&map, &host_id);
        event!(
            Level::INFO,
            host_id = %host_id,
            version = map.version(),
            shards = shard_set.len(),
            "cluster db received initial topology"
        );
        let database = Arc::new(new_database(namespaces, shard_set, &options)?);

        let watcher = TopologyWatcher::new(
            host_id.clone(),
            database.clone(),
            topology.clone(),
            options.shard_analysis_interval_duration(),
        );
        Ok(Self {
            host_id,
            topology,
            watch: Mutex::new(watch),
            database,
            watcher,
        })
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn topology(&self) -> &Arc<dyn Topology> {
        &self.topology
    }

    /// The wrapped storage engine.
    pub fn inner(&self) -> &Arc<D> {
        &self.database
    }

    pub async fn is_watching(&self) -> bool {
        self.watcher.is_watching().await
    }
}

#[async_trait]
impl<D: Database + 'static> Database for ClusterDatabase<D> {
    async fn open(&self) -> Result<()> {
        {
            let mut watch = self.watch.lock().await;
            // Only the newest snapshot matters, however many updates queued up.
            if watch.try_take_change() {
                if let Some(map) = watch.get() {
                    self.database
                        .assign_shard_set(host_or_empty_shard_set(&map, &self.host_id));
                }
            }
        }

        self.database.open().await?;

        let watch = self.watch.lock().await.clone();
        self.watcher.start(watch).await?;
        event!(Level::INFO, host_id = %self.host_id, "cluster db opened");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.database.close().await?;
        self.watcher.stop().await?;
        event!(Level::INFO, host_id = %self.host_id, "cluster db closed");
        Ok(())
    }

    fn assign_shard_set(&self, shard_set: ShardSet) {
        self.database.assign_shard_set(shard_set)
    }

    fn shard_set(&self) -> ShardSet {
        self.database.shard_set()
    }

    fn namespaces(&self) -> Vec<Arc<dyn Namespace>> {
        self.database.namespaces()
    }

    fn namespace(&self, id: &str) -> Option<Arc<dyn Namespace>> {
        self.database.namespace(id)
    }

    fn is_open(&self) -> bool {
        self.database.is_open()
    }

    async fn write(&self, namespace: &str, series_id: &str, datapoint: Datapoint) -> Result<()> {
        self.database.write(namespace, series_id, datapoint).await
    }

    async fn read(
        &self,
        namespace: &str,
        series_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Datapoint>> {
        self.database.read(namespace, series_id, start, end).await
    }
}
