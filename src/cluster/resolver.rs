use crate::sharding::ShardSet;
use crate::topology::TopologyMap;
use tracing::{Level, event};

/// Returns the shard set `host_id` owns in `map`, or an empty shard set that
/// keeps the map's hash function when the host is absent.
///
/// An absent host is a valid transient state (for example while joining the
/// cluster) and is only reported as a warning.
pub fn host_or_empty_shard_set(map: &TopologyMap, host_id: &str) -> ShardSet {
    if let Some(host_shard_set) = map.lookup_host_shard_set(host_id) {
        return host_shard_set.shard_set().clone();
    }
    event!(
        Level::WARN,
        host_id = %host_id,
        version = map.version(),
        "topology has no shard set for host"
    );
    ShardSet::empty(map.shard_set().hash_fn())
}
