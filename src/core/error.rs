use thiserror::Error;

use super::types::ShardId;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Topology init error: {0}")]
    TopologyInit(String),

    #[error("Topology watch error: {0}")]
    TopologyWatch(String),

    #[error("cluster db is already watching topology")]
    AlreadyWatchingTopology,

    #[error("cluster db is not watching topology")]
    NotWatchingTopology,

    #[error("topology constructed is not a dynamic topology")]
    NotDynamicTopology,

    #[error("Host '{0}' not found in topology")]
    HostNotFound(String),

    #[error("Shard {shard_id} not found for host '{host_id}'")]
    ShardNotFound { host_id: String, shard_id: ShardId },

    #[error("Shard {shard_id} cannot transition from {from} to {to}")]
    InvalidShardTransition {
        shard_id: ShardId,
        from: String,
        to: String,
    },

    #[error("Namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("Shard {0} is not owned by this node")]
    ShardNotOwned(ShardId),

    #[error("Database is not open")]
    DatabaseNotOpen,

    #[error("Database is already open")]
    DatabaseAlreadyOpen,

    #[error("Database is closed")]
    DatabaseClosed,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;


impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
