// ============================================================================
// clusterdb: cluster membership layer for a time-series database node
// ============================================================================

pub mod core;
pub mod sharding;
pub mod topology;
pub mod storage;
pub mod cluster;
pub mod facade;

// Re-export main types for convenience
pub use facade::ClusterDatabase;
pub use crate::core::{DbError, Result, ShardId};
pub use sharding::{HashFn, HashRange, Shard, ShardSet, ShardState};

pub use topology::{
    DynamicInitializer, DynamicTopology, Host, HostShardSet, InMemoryDynamicTopology, MapWatch,
    StaticInitializer, StaticTopology, Topology, TopologyInitializer, TopologyMap,
};

pub use storage::{
    Database, DatabaseOptions, Datapoint, InMemoryDatabase, Namespace, NamespaceMetadata,
    NamespaceOptions, NamespaceShard, NewDatabaseFn,
};

pub use cluster::{
    AnalysisSkip, ShardAnalysisReport, ShardAvailabilityAnalyzer, TopologyWatcher,
    host_or_empty_shard_set,
};

/// Default interval between shard availability analysis passes, in milliseconds.
pub const DEFAULT_SHARD_ANALYSIS_INTERVAL_MS: u64 = 1_000;
