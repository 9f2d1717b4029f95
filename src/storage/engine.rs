use super::options::{DatabaseOptions, NamespaceMetadata};
use crate::core::{Result, ShardId};
use crate::sharding::ShardSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single timestamped sample of a series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Datapoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Bootstrap view of one shard inside a namespace.
pub trait NamespaceShard: Send + Sync {
    fn id(&self) -> ShardId;

    /// True once the shard has finished bootstrapping in this namespace.
    fn is_bootstrapped(&self) -> bool;
}

/// A named data partition of the storage engine.
pub trait Namespace: Send + Sync {
    fn id(&self) -> &str;

    /// Shards currently held by this namespace.
    fn shards(&self) -> Vec<Arc<dyn NamespaceShard>>;
}

/// Storage engine contract - allows pluggable time-series backends
#[async_trait]
pub trait Database: Send + Sync {
    async fn open(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Replaces the set of shards this engine serves. Never fails; shards that
    /// left the set are dropped and new ones start un-bootstrapped.
    fn assign_shard_set(&self, shard_set: ShardSet);

    /// The currently assigned shard set
    fn shard_set(&self) -> ShardSet;

    fn namespaces(&self) -> Vec<Arc<dyn Namespace>>;

    fn namespace(&self, id: &str) -> Option<Arc<dyn Namespace>>;

    fn is_open(&self) -> bool;

    /// Write a datapoint for a series
    async fn write(&self, namespace: &str, series_id: &str, datapoint: Datapoint) -> Result<()>;

    /// Read datapoints of a series within `[start, end)`, oldest first
    async fn read(
        &self,
        namespace: &str,
        series_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Datapoint>>;
}

/// Constructs the storage engine wrapped by a cluster database.
pub type NewDatabaseFn<D> =
    Box<dyn FnOnce(&[NamespaceMetadata], ShardSet, &DatabaseOptions) -> Result<D> + Send>;
