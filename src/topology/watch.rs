use super::TopologyMap;
use crate::core::{DbError, Result};
use std::sync::Arc;
use tokio::sync::watch;

pub(crate) type MapSender = watch::Sender<Option<Arc<TopologyMap>>>;

/// Subscription to topology map changes.
///
/// Snapshots overwrite each other: if several changes land before the watcher
/// looks, it observes a single change and [`MapWatch::get`] returns the newest
/// map. Clones keep the seen/unseen position of the watch they came from.
#[derive(Debug, Clone)]
pub struct MapWatch {
    rx: watch::Receiver<Option<Arc<TopologyMap>>>,
}

impl MapWatch {
    pub(crate) fn new(rx: watch::Receiver<Option<Arc<TopologyMap>>>) -> Self {
        Self { rx }
    }

    /// Waits until the topology has delivered its first snapshot.
    ///
    /// No timeout is applied; a topology that never becomes ready blocks
    /// forever.
    pub async fn wait_ready(&mut self) -> Result<Arc<TopologyMap>> {
        let current = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| {
                DbError::TopologyWatch(
                    "topology closed before delivering a snapshot".to_string(),
                )
            })?;
        (*current).clone().ok_or_else(|| {
            DbError::TopologyWatch("topology delivered an empty snapshot".to_string())
        })
    }

    /// Waits for the next unseen change and marks it seen.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| DbError::TopologyWatch("topology watch closed".to_string()))
    }

    /// Consumes a pending change without waiting. Returns false when nothing
    /// new has arrived since the last observation.
    pub fn try_take_change(&mut self) -> bool {
        match self.rx.has_changed() {
            Ok(true) => {
                self.rx.borrow_and_update();
                true
            }
            _ => false,
        }
    }

    /// Returns the latest delivered snapshot.
    pub fn get(&self) -> Option<Arc<TopologyMap>> {
        self.rx.borrow().clone()
    }
}
