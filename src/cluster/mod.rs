//! Topology watch, shard-set resolution and shard availability promotion.

pub mod analyzer;
pub mod resolver;
pub mod watch_loop;

pub use analyzer::{AnalysisSkip, ShardAnalysisReport, ShardAvailabilityAnalyzer};
pub use resolver::host_or_empty_shard_set;
pub use watch_loop::TopologyWatcher;
