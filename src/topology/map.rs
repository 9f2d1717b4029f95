use crate::core::{DbError, Result, ShardId};
use crate::sharding::{HashFn, Shard, ShardSet, ShardState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A cluster member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Host {
    pub id: String,
    pub address: String,
}

impl Host {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// The shards a single host owns in a topology snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostShardSet {
    host: Host,
    shard_set: ShardSet,
}

impl HostShardSet {
    pub fn new(host: Host, shard_set: ShardSet) -> Self {
        Self { host, shard_set }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn shard_set(&self) -> &ShardSet {
        &self.shard_set
    }
}

/// Immutable snapshot of shard ownership across the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyMap {
    version: u64,
    replicas: usize,
    hosts: BTreeMap<String, HostShardSet>,
    shard_set: ShardSet,
}

impl TopologyMap {
    pub fn builder(num_shards: u32) -> TopologyMapBuilder {
        TopologyMapBuilder::new(num_shards)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Returns the shard set owned by `host_id`, if the host is in the map.
    pub fn lookup_host_shard_set(&self, host_id: &str) -> Option<&HostShardSet> {
        self.hosts.get(host_id)
    }

    pub fn host_shard_sets(&self) -> impl Iterator<Item = &HostShardSet> {
        self.hosts.values()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values().map(HostShardSet::host)
    }

    pub fn host_ids(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    /// Union of every host's shards, carrying the cluster hash function.
    pub fn shard_set(&self) -> &ShardSet {
        &self.shard_set
    }

    /// Returns a copy of this map, one version later, with a host's shard moved
    /// into `state`.
    ///
    /// Only forward transitions are accepted: initializing to available, and
    /// initializing or available to leaving.
    pub fn with_shard_state(
        &self,
        host_id: &str,
        shard_id: ShardId,
        state: ShardState,
    ) -> Result<TopologyMap> {
        let entry = self
            .hosts
            .get(host_id)
            .ok_or_else(|| DbError::HostNotFound(host_id.to_string()))?;
        let current = entry
            .shard_set
            .shard(shard_id)
            .ok_or_else(|| DbError::ShardNotFound {
                host_id: host_id.to_string(),
                shard_id,
            })?;

        let allowed = matches!(
            (current.state(), state),
            (ShardState::Initializing, ShardState::Available)
                | (ShardState::Initializing, ShardState::Leaving)
                | (ShardState::Available, ShardState::Leaving)
        );
        if !allowed {
            return Err(DbError::InvalidShardTransition {
                shard_id,
                from: current.state().to_string(),
                to: state.to_string(),
            });
        }

        let shards = entry.shard_set.all().map(|s| {
            if s.id() == shard_id {
                s.with_state(state)
            } else {
                *s
            }
        });
        let updated = HostShardSet::new(
            entry.host.clone(),
            ShardSet::new(shards.collect::<Vec<_>>(), entry.shard_set.hash_fn()),
        );

        let mut hosts = self.hosts.clone();
        hosts.insert(host_id.to_string(), updated);
        Ok(TopologyMap {
            version: self.version + 1,
            replicas: self.replicas,
            hosts,
            shard_set: self.shard_set.clone(),
        })
    }
}

/// Builds a validated [`TopologyMap`].
#[derive(Debug, Clone)]
pub struct TopologyMapBuilder {
    num_shards: u32,
    version: u64,
    replicas: usize,
    hosts: Vec<(Host, Vec<Shard>)>,
}

impl TopologyMapBuilder {
    fn new(num_shards: u32) -> Self {
        Self {
            num_shards,
            version: 1,
            replicas: 1,
            hosts: Vec::new(),
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Adds a host whose address mirrors its id.
    pub fn host(self, host_id: impl Into<String>, shards: Vec<Shard>) -> Self {
        let host_id = host_id.into();
        let address = host_id.clone();
        self.host_with_address(Host::new(host_id, address), shards)
    }

    pub fn host_with_address(mut self, host: Host, shards: Vec<Shard>) -> Self {
        self.hosts.push((host, shards));
        self
    }

    pub fn build(self) -> Result<TopologyMap> {
        if self.num_shards == 0 {
            return Err(DbError::InvalidConfig("num_shards must be >= 1".to_string()));
        }
        if self.replicas == 0 {
            return Err(DbError::InvalidConfig("replicas must be >= 1".to_string()));
        }

        let hash_fn = HashFn::new(self.num_shards);
        let mut hosts = BTreeMap::new();
        let mut all_shards = BTreeMap::new();
        for (host, shards) in self.hosts {
            if host.id.trim().is_empty() {
                return Err(DbError::InvalidConfig("host id must not be empty".to_string()));
            }
            if hosts.contains_key(&host.id) {
                return Err(DbError::InvalidConfig(format!(
                    "host '{}' appears more than once",
                    host.id
                )));
            }
            let mut seen = HashSet::new();
            for shard in &shards {
                if shard.id() >= self.num_shards {
                    return Err(DbError::InvalidConfig(format!(
                        "shard {} for host '{}' is out of range (num_shards={})",
                        shard.id(),
                        host.id,
                        self.num_shards
                    )));
                }
                if !seen.insert(shard.id()) {
                    return Err(DbError::InvalidConfig(format!(
                        "shard {} listed twice for host '{}'",
                        shard.id(),
                        host.id
                    )));
                }
                all_shards.entry(shard.id()).or_insert(*shard);
            }
            let id = host.id.clone();
            hosts.insert(id, HostShardSet::new(host, ShardSet::new(shards, hash_fn)));
        }

        Ok(TopologyMap {
            version: self.version,
            replicas: self.replicas,
            hosts,
            shard_set: ShardSet::new(all_shards.into_values(), hash_fn),
        })
    }
}
