use super::analyzer::ShardAvailabilityAnalyzer;
use super::resolver::host_or_empty_shard_set;
use crate::core::{DbError, Result};
use crate::storage::Database;
use crate::topology::{MapWatch, Topology};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, Level, event, info_span};

/// State shared by the watch loop and its periodic analysis task.
struct WatchContext<D> {
    host_id: String,
    database: Arc<D>,
    topology: Arc<dyn Topology>,
    analysis_interval: Duration,
    /// Held for every reassignment and every analysis pass so the two never
    /// run at the same time.
    analyzer: Mutex<ShardAvailabilityAnalyzer>,
}

impl<D: Database> WatchContext<D> {
    async fn reassign(&self, watch: &MapWatch) {
        let Some(map) = watch.get() else {
            return;
        };
        let _pass = self.analyzer.lock().await;
        let shard_set = host_or_empty_shard_set(&map, &self.host_id);
        event!(
            Level::INFO,
            host_id = %self.host_id,
            version = map.version(),
            shards = shard_set.len(),
            "assigning shard set from topology update"
        );
        self.database.assign_shard_set(shard_set);
    }

    async fn analyze(&self, watch: &MapWatch) {
        let Some(map) = watch.get() else {
            return;
        };
        let mut analyzer = self.analyzer.lock().await;
        let span = info_span!(
            "cluster.shard_analysis",
            host_id = %self.host_id,
            version = map.version()
        );
        analyzer
            .analyze_and_report(&map, &*self.topology, &*self.database)
            .instrument(span)
            .await;
    }
}

#[derive(Default)]
struct WatchState {
    watching: bool,
    done_tx: Option<oneshot::Sender<()>>,
    closed: Option<JoinHandle<()>>,
}

/// Owns the background topology watch loop and starts or stops it exactly
/// once per cycle.
///
/// Dropping a watcher that is still running drops the done signal, which also
/// ends the loop.
pub struct TopologyWatcher<D> {
    context: Arc<WatchContext<D>>,
    state: Mutex<WatchState>,
}

impl<D: Database + 'static> TopologyWatcher<D> {
    pub fn new(
        host_id: impl Into<String>,
        database: Arc<D>,
        topology: Arc<dyn Topology>,
        analysis_interval: Duration,
    ) -> Self {
        let host_id = host_id.into();
        Self {
            context: Arc::new(WatchContext {
                analyzer: Mutex::new(ShardAvailabilityAnalyzer::new(host_id.clone())),
                host_id,
                database,
                topology,
                analysis_interval,
            }),
            state: Mutex::new(WatchState::default()),
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.state.lock().await.watching
    }

    /// Spawns the watch loop fed by `watch`. Returns without waiting for the
    /// loop to begin.
    pub async fn start(&self, watch: MapWatch) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.watching {
            return Err(DbError::AlreadyWatchingTopology);
        }

        state.watching = true;
        let (done_tx, done_rx) = oneshot::channel();
        state.done_tx = Some(done_tx);
        state.closed = Some(tokio::spawn(active_topology_watch(
            self.context.clone(),
            watch,
            done_rx,
        )));
        event!(Level::DEBUG, host_id = %self.context.host_id, "topology watch started");
        Ok(())
    }

    /// Signals the loop to stop and waits until it and its analysis task have
    /// exited. Nothing reassigns or promotes shards after this returns.
    ///
    /// If the returned future is dropped before the loop exits, the watcher
    /// stays in the watching state and `stop` can be called again to finish
    /// the join.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.watching {
            return Err(DbError::NotWatchingTopology);
        }

        if let Some(done_tx) = state.done_tx.take() {
            let _ = done_tx.send(());
        }
        let joined = match state.closed.as_mut() {
            Some(closed) => closed.await,
            None => Ok(()),
        };
        state.closed = None;
        state.watching = false;
        joined.map_err(|err| DbError::ExecutionError(format!("topology watch join: {}", err)))?;

        event!(Level::DEBUG, host_id = %self.context.host_id, "topology watch stopped");
        Ok(())
    }
}

async fn active_topology_watch<D: Database + 'static>(
    context: Arc<WatchContext<D>>,
    mut watch: MapWatch,
    mut done_rx: oneshot::Receiver<()>,
) {
    let (report_stop_tx, report_stop_rx) = oneshot::channel();
    let reporter = tokio::spawn(report_shard_states(
        context.clone(),
        watch.clone(),
        report_stop_rx,
    ));

    let mut topology_open = true;
    loop {
        tokio::select! {
            biased;
            _ = &mut done_rx => break,
            changed = watch.changed(), if topology_open => match changed {
                Ok(()) => context.reassign(&watch).await,
                Err(err) => {
                    event!(
                        Level::WARN,
                        error = %err,
                        "topology watch closed; keeping last shard set"
                    );
                    topology_open = false;
                }
            },
        }
    }

    let _ = report_stop_tx.send(());
    if let Err(err) = reporter.await {
        event!(Level::ERROR, error = %err, "shard state reporter join failed");
    }
}

async fn report_shard_states<D: Database + 'static>(
    context: Arc<WatchContext<D>>,
    watch: MapWatch,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let period = context.analysis_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => context.analyze(&watch).await,
        }
    }
}
