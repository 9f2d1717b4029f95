//! Cluster topology: snapshots, change subscriptions and topology stores.

pub mod in_memory;
pub mod map;
pub mod static_topology;
pub mod traits;
pub mod watch;

pub use in_memory::{DynamicInitializer, InMemoryDynamicTopology};
pub use map::{Host, HostShardSet, TopologyMap, TopologyMapBuilder};
pub use static_topology::{StaticInitializer, StaticTopology};
pub use traits::{DynamicTopology, Topology, TopologyInitializer};
pub use watch::MapWatch;
