use super::engine::{Database, Datapoint, Namespace, NamespaceShard};
use super::options::{DatabaseOptions, NamespaceMetadata};
use crate::core::{DbError, Result, ShardId};
use crate::sharding::ShardSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{Level, event};

/// One shard of one namespace: its series and bootstrap flag.
pub struct MemoryShard {
    id: ShardId,
    bootstrapped: AtomicBool,
    series: RwLock<HashMap<String, Vec<Datapoint>>>,
}

impl MemoryShard {
    fn new(id: ShardId, bootstrapped: bool) -> Self {
        Self {
            id,
            bootstrapped: AtomicBool::new(bootstrapped),
            series: RwLock::new(HashMap::new()),
        }
    }

    fn mark_bootstrapped(&self) {
        self.bootstrapped.store(true, Ordering::Release);
    }

    fn write(&self, series_id: &str, datapoint: Datapoint) -> Result<()> {
        let mut series = self.series.write()?;
        let points = series.entry(series_id.to_string()).or_default();
        let at = points.partition_point(|p| p.timestamp <= datapoint.timestamp);
        points.insert(at, datapoint);
        Ok(())
    }

    fn read(
        &self,
        series_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Datapoint>> {
        let series = self.series.read()?;
        Ok(series
            .get(series_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= start && p.timestamp < end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl NamespaceShard for MemoryShard {
    fn id(&self) -> ShardId {
        self.id
    }

    fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }
}

/// A namespace holding shards in memory.
pub struct MemoryNamespace {
    metadata: NamespaceMetadata,
    shards: RwLock<BTreeMap<ShardId, Arc<MemoryShard>>>,
}

impl MemoryNamespace {
    fn new(metadata: NamespaceMetadata) -> Self {
        Self {
            metadata,
            shards: RwLock::new(BTreeMap::new()),
        }
    }

    fn shard(&self, id: ShardId) -> Result<Option<Arc<MemoryShard>>> {
        Ok(self.shards.read()?.get(&id).cloned())
    }

    /// Keeps shards still in `shard_set`, drops the rest, adds new ones.
    fn assign(&self, shard_set: &ShardSet, bootstrap_on_assign: bool) {
        let mut shards = self.shards.write().unwrap_or_else(PoisonError::into_inner);
        shards.retain(|id, _| shard_set.contains(*id));
        let bootstrapped = bootstrap_on_assign || !self.metadata.options.needs_bootstrap;
        for id in shard_set.all_ids() {
            shards
                .entry(id)
                .or_insert_with(|| Arc::new(MemoryShard::new(id, bootstrapped)));
        }
    }
}

impl Namespace for MemoryNamespace {
    fn id(&self) -> &str {
        &self.metadata.id
    }

    fn shards(&self) -> Vec<Arc<dyn NamespaceShard>> {
        self.shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.clone() as Arc<dyn NamespaceShard>)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Open,
    Closed,
}

/// In-memory time-series storage engine.
///
/// Series are routed to shards with the assigned shard set's hash function;
/// only owned shards accept reads and writes. Nothing is bootstrapped from
/// disk: callers flip bootstrap state with [`mark_bootstrapped`](Self::mark_bootstrapped)
/// or [`bootstrap_all`](Self::bootstrap_all).
pub struct InMemoryDatabase {
    options: DatabaseOptions,
    namespaces: BTreeMap<String, Arc<MemoryNamespace>>,
    shard_set: RwLock<ShardSet>,
    lifecycle: Mutex<Lifecycle>,
}

impl InMemoryDatabase {
    pub fn new(
        namespaces: &[NamespaceMetadata],
        shard_set: ShardSet,
        options: &DatabaseOptions,
    ) -> Result<Self> {
        NamespaceMetadata::validate_all(namespaces)?;
        options.validate()?;

        let namespaces: BTreeMap<_, _> = namespaces
            .iter()
            .map(|md| (md.id.clone(), Arc::new(MemoryNamespace::new(md.clone()))))
            .collect();
        for ns in namespaces.values() {
            ns.assign(&shard_set, options.bootstrap_on_assign);
        }

        Ok(Self {
            options: options.clone(),
            namespaces,
            shard_set: RwLock::new(shard_set),
            lifecycle: Mutex::new(Lifecycle::Created),
        })
    }

    pub fn memory_namespace(&self, id: &str) -> Result<Arc<MemoryNamespace>> {
        self.namespaces
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::NamespaceNotFound(id.to_string()))
    }

    /// Marks a shard bootstrapped in one namespace.
    pub fn mark_bootstrapped(&self, namespace: &str, shard_id: ShardId) -> Result<()> {
        let ns = self.memory_namespace(namespace)?;
        let shard = ns.shard(shard_id)?.ok_or(DbError::ShardNotOwned(shard_id))?;
        shard.mark_bootstrapped();
        event!(Level::DEBUG, namespace = %namespace, shard_id, "shard bootstrapped");
        Ok(())
    }

    /// Marks every held shard bootstrapped in every namespace.
    pub fn bootstrap_all(&self) -> Result<()> {
        for ns in self.namespaces.values() {
            for shard in ns.shards.read()?.values() {
                shard.mark_bootstrapped();
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match *self.lifecycle.lock()? {
            Lifecycle::Open => Ok(()),
            Lifecycle::Created => Err(DbError::DatabaseNotOpen),
            Lifecycle::Closed => Err(DbError::DatabaseClosed),
        }
    }

    fn owned_shard(&self, namespace: &str, series_id: &str) -> Result<Arc<MemoryShard>> {
        let ns = self.memory_namespace(namespace)?;
        let shard_id = self.shard_set.read()?.lookup(series_id);
        ns.shard(shard_id)?.ok_or(DbError::ShardNotOwned(shard_id))
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn open(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock()?;
        match *lifecycle {
            Lifecycle::Created => {
                *lifecycle = Lifecycle::Open;
                Ok(())
            }
            Lifecycle::Open => Err(DbError::DatabaseAlreadyOpen),
            Lifecycle::Closed => Err(DbError::DatabaseClosed),
        }
    }

    async fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock()?;
        match *lifecycle {
            Lifecycle::Open => {
                *lifecycle = Lifecycle::Closed;
                Ok(())
            }
            Lifecycle::Created => Err(DbError::DatabaseNotOpen),
            Lifecycle::Closed => Err(DbError::DatabaseClosed),
        }
    }

    fn assign_shard_set(&self, shard_set: ShardSet) {
        let mut current = self.shard_set.write().unwrap_or_else(PoisonError::into_inner);
        for ns in self.namespaces.values() {
            ns.assign(&shard_set, self.options.bootstrap_on_assign);
        }
        event!(
            Level::DEBUG,
            previous = current.len(),
            next = shard_set.len(),
            "storage shard set assigned"
        );
        *current = shard_set;
    }

    fn shard_set(&self) -> ShardSet {
        self.shard_set
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn namespaces(&self) -> Vec<Arc<dyn Namespace>> {
        self.namespaces
            .values()
            .map(|ns| ns.clone() as Arc<dyn Namespace>)
            .collect()
    }

    fn namespace(&self, id: &str) -> Option<Arc<dyn Namespace>> {
        self.namespaces
            .get(id)
            .map(|ns| ns.clone() as Arc<dyn Namespace>)
    }

    fn is_open(&self) -> bool {
        self.ensure_open().is_ok()
    }

    async fn write(&self, namespace: &str, series_id: &str, datapoint: Datapoint) -> Result<()> {
        self.ensure_open()?;
        self.owned_shard(namespace, series_id)?
            .write(series_id, datapoint)
    }

    async fn read(
        &self,
        namespace: &str,
        series_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Datapoint>> {
        self.ensure_open()?;
        self.owned_shard(namespace, series_id)?
            .read(series_id, start, end)
    }
}
