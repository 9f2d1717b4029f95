use crate::core::{DbError, ShardId};
use crate::sharding::Shard;
use crate::storage::Database;
use crate::topology::{Topology, TopologyMap};
use std::collections::{BTreeMap, HashMap};
use tracing::{Level, event};

/// Why an analysis pass stopped before attempting promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSkip {
    /// The host has no entry in the snapshot.
    HostAbsent,
    /// The host owns no initializing shards.
    NoInitializingShards,
    /// The topology cannot mark shards available.
    NotDynamicTopology,
}

/// Outcome of one analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardAnalysisReport {
    pub skipped: Option<AnalysisSkip>,
    /// Initializing shards seen this pass, with the number of namespaces each
    /// has finished bootstrapping in.
    pub bootstrap_counts: BTreeMap<ShardId, usize>,
    pub namespace_count: usize,
    pub promoted: Vec<ShardId>,
    pub failed: Vec<ShardId>,
}

impl ShardAnalysisReport {
    fn skipped(reason: AnalysisSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

/// Finds initializing shards that have bootstrapped in every namespace and
/// asks the topology to mark them available.
///
/// Scratch maps are reused between passes but emptied at the start and end of
/// each one, so no partial progress carries over between ticks.
pub struct ShardAvailabilityAnalyzer {
    host_id: String,
    initializing: HashMap<ShardId, Shard>,
    bootstrap_count: HashMap<ShardId, usize>,
}

impl ShardAvailabilityAnalyzer {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            initializing: HashMap::new(),
            bootstrap_count: HashMap::new(),
        }
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Runs one pass against `map`. Failures are logged and reported, never
    /// returned: the serving path must not depend on promotion succeeding.
    pub async fn analyze_and_report(
        &mut self,
        map: &TopologyMap,
        topology: &dyn Topology,
        database: &dyn Database,
    ) -> ShardAnalysisReport {
        self.reset();
        let report = self.analyze(map, topology, database).await;
        self.reset();
        report
    }

    async fn analyze(
        &mut self,
        map: &TopologyMap,
        topology: &dyn Topology,
        database: &dyn Database,
    ) -> ShardAnalysisReport {
        let Some(entry) = map.lookup_host_shard_set(&self.host_id) else {
            return ShardAnalysisReport::skipped(AnalysisSkip::HostAbsent);
        };

        for shard in entry.shard_set().all().filter(|s| s.is_initializing()) {
            self.initializing.insert(shard.id(), *shard);
        }
        if self.initializing.is_empty() {
            return ShardAnalysisReport::skipped(AnalysisSkip::NoInitializingShards);
        }

        let Some(dynamic) = topology.as_dynamic() else {
            let err = DbError::NotDynamicTopology;
            event!(
                Level::ERROR,
                error = %err,
                initializing = self.initializing.len(),
                "cluster db cannot mark shard available"
            );
            return ShardAnalysisReport::skipped(AnalysisSkip::NotDynamicTopology);
        };

        let namespaces = database.namespaces();
        for namespace in &namespaces {
            for shard in namespace.shards() {
                if !self.initializing.contains_key(&shard.id()) || !shard.is_bootstrapped() {
                    continue;
                }
                *self.bootstrap_count.entry(shard.id()).or_default() += 1;
            }
        }

        let mut report = ShardAnalysisReport {
            namespace_count: namespaces.len(),
            bootstrap_counts: self
                .initializing
                .keys()
                .map(|id| (*id, self.bootstrap_count.get(id).copied().unwrap_or(0)))
                .collect(),
            ..Default::default()
        };

        for (shard_id, count) in &report.bootstrap_counts {
            if *count != namespaces.len() {
                continue;
            }
            match dynamic.mark_shard_available(&self.host_id, *shard_id).await {
                Ok(()) => {
                    event!(
                        Level::INFO,
                        shard_id = *shard_id,
                        "successfully marked shard available"
                    );
                    report.promoted.push(*shard_id);
                }
                Err(err) => {
                    event!(
                        Level::ERROR,
                        shard_id = *shard_id,
                        error = %err,
                        "cluster db failed marking shard available"
                    );
                    report.failed.push(*shard_id);
                }
            }
        }

        report
    }

    fn reset(&mut self) {
        self.initializing.clear();
        self.bootstrap_count.clear();
    }
}
