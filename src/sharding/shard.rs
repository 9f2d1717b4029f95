use super::HashRange;
use crate::core::ShardId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a shard on its owning host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ShardState {
    /// Assigned to the host and still bootstrapping.
    #[default]
    Initializing,
    /// Bootstrapped everywhere and serving.
    Available,
    /// Being handed off to another host.
    Leaving,
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShardState::Initializing => "initializing",
            ShardState::Available => "available",
            ShardState::Leaving => "leaving",
        };
        f.write_str(name)
    }
}

/// A shard descriptor as seen in a topology snapshot.
///
/// The hash range is filled in when the shard joins a [`ShardSet`](super::ShardSet).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Shard {
    id: ShardId,
    state: ShardState,
    hash_range: Option<HashRange>,
}

impl Shard {
    /// Creates an initializing shard.
    pub fn new(id: ShardId) -> Self {
        Self {
            id,
            state: ShardState::Initializing,
            hash_range: None,
        }
    }

    pub fn with_state(mut self, state: ShardState) -> Self {
        self.state = state;
        self
    }

    pub(crate) fn with_hash_range(mut self, hash_range: Option<HashRange>) -> Self {
        self.hash_range = hash_range;
        self
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    pub fn state(&self) -> ShardState {
        self.state
    }

    pub fn hash_range(&self) -> Option<HashRange> {
        self.hash_range
    }

    pub fn is_initializing(&self) -> bool {
        self.state == ShardState::Initializing
    }
}
