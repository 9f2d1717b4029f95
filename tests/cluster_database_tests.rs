use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use clusterdb::{
    ClusterDatabase, Database, DatabaseOptions, Datapoint, DbError, DynamicInitializer, HashFn,
    InMemoryDatabase, InMemoryDynamicTopology, Namespace, NamespaceMetadata, Result, Shard,
    ShardSet, ShardState, StaticInitializer, Topology, TopologyInitializer, TopologyMap,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const TICK: Duration = Duration::from_millis(10);

fn options() -> DatabaseOptions {
    DatabaseOptions::default().shard_analysis_interval(TICK)
}

fn namespaces(ids: &[&str]) -> Vec<NamespaceMetadata> {
    ids.iter().map(|id| NamespaceMetadata::new(*id)).collect()
}

fn single_host_map(version: u64, host_id: &str, shards: Vec<Shard>) -> TopologyMap {
    TopologyMap::builder(16)
        .version(version)
        .host(host_id, shards)
        .build()
        .unwrap()
}

fn shards(ids: &[u32]) -> Vec<Shard> {
    ids.iter().map(|id| Shard::new(*id)).collect()
}

async fn dynamic_cluster_db(
    host_id: &str,
    map: TopologyMap,
    ns: &[&str],
) -> (Arc<InMemoryDynamicTopology>, ClusterDatabase<InMemoryDatabase>) {
    let topology = Arc::new(InMemoryDynamicTopology::new(map));
    let db = ClusterDatabase::new(
        &namespaces(ns),
        host_id,
        &DynamicInitializer::new(topology.clone()),
        options(),
    )
    .await
    .unwrap();
    (topology, db)
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

fn expect_err<T>(result: Result<T>) -> DbError {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(err) => err,
    }
}

fn namespace_shard_ids(ns: &Arc<dyn Namespace>) -> Vec<u32> {
    ns.shards().iter().map(|s| s.id()).collect()
}

struct FailingInitializer;

#[async_trait]
impl TopologyInitializer for FailingInitializer {
    async fn init(&self) -> Result<Arc<dyn Topology>> {
        Err(DbError::TopologyInit("etcd unreachable".to_string()))
    }
}

/// Engine whose open/close fail a configurable number of times.
struct FlakyDatabase {
    inner: InMemoryDatabase,
    open_failures: AtomicU32,
    close_failures: AtomicU32,
}

impl FlakyDatabase {
    fn new(inner: InMemoryDatabase, open_failures: u32, close_failures: u32) -> Self {
        Self {
            inner,
            open_failures: AtomicU32::new(open_failures),
            close_failures: AtomicU32::new(close_failures),
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Database for FlakyDatabase {
    async fn open(&self) -> Result<()> {
        if Self::take_failure(&self.open_failures) {
            return Err(DbError::ExecutionError("disk not ready".to_string()));
        }
        self.inner.open().await
    }

    async fn close(&self) -> Result<()> {
        if Self::take_failure(&self.close_failures) {
            return Err(DbError::ExecutionError("flush in progress".to_string()));
        }
        self.inner.close().await
    }

    fn assign_shard_set(&self, shard_set: ShardSet) {
        self.inner.assign_shard_set(shard_set)
    }

    fn shard_set(&self) -> ShardSet {
        self.inner.shard_set()
    }

    fn namespaces(&self) -> Vec<Arc<dyn Namespace>> {
        self.inner.namespaces()
    }

    fn namespace(&self, id: &str) -> Option<Arc<dyn Namespace>> {
        self.inner.namespace(id)
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn write(&self, namespace: &str, series_id: &str, datapoint: Datapoint) -> Result<()> {
        self.inner.write(namespace, series_id, datapoint).await
    }

    async fn read(
        &self,
        namespace: &str,
        series_id: &str,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Result<Vec<Datapoint>> {
        self.inner.read(namespace, series_id, start, end).await
    }
}

async fn flaky_cluster_db(
    open_failures: u32,
    close_failures: u32,
) -> (Arc<InMemoryDynamicTopology>, ClusterDatabase<FlakyDatabase>) {
    let topology = Arc::new(InMemoryDynamicTopology::new(single_host_map(
        1,
        "h1",
        shards(&[1, 2, 3]),
    )));
    let db = ClusterDatabase::new_with_constructor(
        &namespaces(&["ns1"]),
        "h1",
        &DynamicInitializer::new(topology.clone()),
        options(),
        Box::new(
            move |ns: &[NamespaceMetadata], shard_set: ShardSet, opts: &DatabaseOptions| {
                Ok(FlakyDatabase::new(
                    InMemoryDatabase::new(ns, shard_set, opts)?,
                    open_failures,
                    close_failures,
                ))
            },
        ),
    )
    .await
    .unwrap();
    (topology, db)
}

#[tokio::test(start_paused = true)]
async fn construction_waits_for_first_topology_snapshot() {
    let topology = Arc::new(InMemoryDynamicTopology::unready());
    let init = DynamicInitializer::new(topology.clone());

    let construct = tokio::spawn(async move {
        ClusterDatabase::new(&namespaces(&["ns1"]), "h1", &init, options()).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!construct.is_finished());

    topology
        .publish(single_host_map(1, "h1", shards(&[4, 7])))
        .unwrap();
    let db = assert_ok!(construct.await.unwrap());
    assert_eq!(db.shard_set().all_ids(), vec![4, 7]);
    assert_eq!(namespace_shard_ids(&db.namespace("ns1").unwrap()), vec![4, 7]);
}

#[tokio::test(start_paused = true)]
async fn construction_errors_propagate_unchanged() {
    let err = expect_err(
        ClusterDatabase::new(&namespaces(&["ns1"]), "h1", &FailingInitializer, options()).await,
    );
    assert!(matches!(err, DbError::TopologyInit(msg) if msg == "etcd unreachable"));

    let map = single_host_map(1, "h1", shards(&[0]));
    let err = expect_err(
        ClusterDatabase::new(
            &namespaces(&["dup", "dup"]),
            "h1",
            &StaticInitializer::new(map.clone()),
            options(),
        )
        .await,
    );
    assert!(matches!(err, DbError::InvalidConfig(_)));

    let err = expect_err(
        ClusterDatabase::<InMemoryDatabase>::new_with_constructor(
            &namespaces(&["ns1"]),
            "h1",
            &StaticInitializer::new(map),
            options(),
            Box::new(|_: &[NamespaceMetadata], _: ShardSet, _: &DatabaseOptions| {
                Err(DbError::ExecutionError("engine construction failed".to_string()))
            }),
        )
        .await,
    );
    assert!(matches!(err, DbError::ExecutionError(msg) if msg == "engine construction failed"));
}

#[tokio::test(start_paused = true)]
async fn absent_host_starts_with_empty_shard_set() {
    let map = single_host_map(1, "h2", shards(&[0, 1]));
    let db = ClusterDatabase::new(
        &namespaces(&["ns1"]),
        "h1",
        &StaticInitializer::new(map),
        options(),
    )
    .await
    .unwrap();

    assert!(db.shard_set().is_empty());
    assert_eq!(db.shard_set().hash_fn(), HashFn::new(16));
}

#[tokio::test(start_paused = true)]
async fn open_applies_update_that_arrived_after_construction() {
    let (topology, db) =
        dynamic_cluster_db("h1", single_host_map(1, "h1", shards(&[1, 2, 3])), &["ns1"]).await;

    topology
        .publish(single_host_map(2, "h1", shards(&[1, 2, 3, 4])))
        .unwrap();
    topology
        .publish(single_host_map(3, "h1", shards(&[1, 2])))
        .unwrap();
    assert_eq!(db.shard_set().all_ids(), vec![1, 2, 3]);

    db.open().await.unwrap();
    assert_eq!(db.shard_set().all_ids(), vec![1, 2]);
    assert!(db.is_watching().await);

    db.close().await.unwrap();
    assert!(!db.is_watching().await);
}

#[tokio::test(start_paused = true)]
async fn topology_change_reassigns_shard_set() {
    let map = single_host_map(1, "h1", shards(&[1, 2, 3]));
    let (topology, db) = dynamic_cluster_db("h1", map, &["ns1", "ns2"]).await;
    db.open().await.unwrap();
    db.inner().mark_bootstrapped("ns1", 3).unwrap();

    topology
        .publish(single_host_map(2, "h1", shards(&[1, 2])))
        .unwrap();
    assert!(wait_until(|| db.shard_set().all_ids() == vec![1, 2]).await);
    for ns in db.namespaces() {
        assert_eq!(namespace_shard_ids(&ns), vec![1, 2]);
    }

    db.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shard_promoted_only_after_bootstrap_in_every_namespace() {
    let (topology, db) =
        dynamic_cluster_db("H1", single_host_map(1, "H1", shards(&[5, 6])), &["ns1", "ns2"]).await;
    db.open().await.unwrap();
    let marks_for = |shard_id: u32| {
        topology
            .mark_calls()
            .unwrap()
            .iter()
            .filter(|(_, id)| *id == shard_id)
            .count()
    };

    // Shard 6 is ready everywhere, so its promotion shows a pass has run.
    db.inner().mark_bootstrapped("ns1", 6).unwrap();
    db.inner().mark_bootstrapped("ns2", 6).unwrap();
    db.inner().mark_bootstrapped("ns1", 5).unwrap();
    assert!(wait_until(|| marks_for(6) == 1).await);
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(marks_for(5), 0);

    db.inner().mark_bootstrapped("ns2", 5).unwrap();
    assert!(wait_until(|| marks_for(5) == 1).await);
    assert!(topology.mark_calls().unwrap().contains(&("H1".to_string(), 5)));

    // The promotion republishes the map; the loop picks up the available state
    // and later ticks leave the shard alone.
    assert!(
        wait_until(|| db.shard_set().shard(5).map(|s| s.state()) == Some(ShardState::Available))
            .await
    );
    tokio::time::sleep(TICK * 5).await;
    assert_eq!(marks_for(5), 1);
    assert_eq!(marks_for(6), 1);

    db.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_promotion_is_retried_on_later_ticks() {
    let (topology, db) =
        dynamic_cluster_db("h1", single_host_map(1, "h1", shards(&[2, 3])), &["ns1"]).await;
    topology.fail_mark_for(2).unwrap();
    db.open().await.unwrap();
    db.inner().bootstrap_all().unwrap();

    assert!(
        wait_until(|| db.shard_set().shard(3).map(|s| s.state()) == Some(ShardState::Available))
            .await
    );
    assert!(
        wait_until(|| {
            topology
                .mark_calls()
                .unwrap()
                .iter()
                .filter(|(_, id)| *id == 2)
                .count()
                >= 2
        })
        .await
    );
    assert_eq!(
        db.shard_set().shard(2).map(|s| s.state()),
        Some(ShardState::Initializing)
    );

    topology.clear_failures().unwrap();
    assert!(
        wait_until(|| db.shard_set().shard(2).map(|s| s.state()) == Some(ShardState::Available))
            .await
    );
    assert!(db.is_open());

    db.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn static_topology_keeps_serving_without_promotion() {
    let map = single_host_map(1, "h1", shards(&[0, 1]));
    let db = ClusterDatabase::new(
        &namespaces(&["ns1"]),
        "h1",
        &StaticInitializer::new(map),
        options(),
    )
    .await
    .unwrap();
    db.open().await.unwrap();
    db.inner().bootstrap_all().unwrap();

    tokio::time::sleep(TICK * 5).await;
    assert!(db.is_open());
    assert!(db.topology().as_dynamic().is_none());
    assert_eq!(
        db.shard_set().shard(0).map(|s| s.state()),
        Some(ShardState::Initializing)
    );

    db.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn nothing_happens_after_close_returns() {
    let (topology, db) =
        dynamic_cluster_db("h1", single_host_map(1, "h1", shards(&[1, 2, 3])), &["ns1"]).await;
    db.open().await.unwrap();
    db.close().await.unwrap();

    topology
        .publish(single_host_map(2, "h1", shards(&[1])))
        .unwrap();
    db.inner().bootstrap_all().unwrap();
    tokio::time::sleep(TICK * 10).await;

    assert_eq!(db.shard_set().all_ids(), vec![1, 2, 3]);
    assert!(topology.mark_calls().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn open_failure_does_not_start_watch() {
    let (_topology, db) = flaky_cluster_db(1, 0).await;

    let err = assert_err!(db.open().await);
    assert!(matches!(err, DbError::ExecutionError(msg) if msg == "disk not ready"));
    assert!(!db.is_watching().await);

    db.open().await.unwrap();
    assert!(db.is_watching().await);
    db.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn close_failure_leaves_watch_running_for_retry() {
    let (topology, db) = flaky_cluster_db(0, 1).await;
    db.open().await.unwrap();

    let err = assert_err!(db.close().await);
    assert!(matches!(err, DbError::ExecutionError(msg) if msg == "flush in progress"));
    assert!(db.is_watching().await);

    topology
        .publish(single_host_map(2, "h1", shards(&[3])))
        .unwrap();
    assert!(wait_until(|| db.shard_set().all_ids() == vec![3]).await);

    assert_ok!(db.close().await);
    assert!(!db.is_watching().await);
}

#[tokio::test(start_paused = true)]
async fn reads_and_writes_delegate_to_engine() {
    let map = single_host_map(1, "h1", shards(&(0..16).collect::<Vec<_>>()));
    let (_topology, db) = dynamic_cluster_db("h1", map, &["metrics"]).await;
    let t = |secs| Utc.timestamp_opt(secs, 0).unwrap();

    assert!(matches!(
        db.write("metrics", "cpu.user", Datapoint::new(t(1), 0.5)).await,
        Err(DbError::DatabaseNotOpen)
    ));
    db.open().await.unwrap();
    db.write("metrics", "cpu.user", Datapoint::new(t(1), 0.5))
        .await
        .unwrap();
    db.write("metrics", "cpu.user", Datapoint::new(t(2), 0.7))
        .await
        .unwrap();

    let points = db.read("metrics", "cpu.user", t(0), t(10)).await.unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].value, 0.7);
    assert!(matches!(
        db.write("missing", "cpu.user", Datapoint::new(t(1), 0.5)).await,
        Err(DbError::NamespaceNotFound(_))
    ));

    db.close().await.unwrap();
}
