use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Database options bundle shared by the storage engine and the cluster layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Interval between shard availability analysis passes.
    pub shard_analysis_interval_ms: u64,

    /// Mark newly assigned shards bootstrapped straight away.
    pub bootstrap_on_assign: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            shard_analysis_interval_ms: crate::DEFAULT_SHARD_ANALYSIS_INTERVAL_MS,
            bootstrap_on_assign: false,
        }
    }
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shard analysis interval
    pub fn shard_analysis_interval(mut self, interval: Duration) -> Self {
        self.shard_analysis_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set whether new shards are bootstrapped on assignment
    pub fn bootstrap_on_assign(mut self, enabled: bool) -> Self {
        self.bootstrap_on_assign = enabled;
        self
    }

    pub fn shard_analysis_interval_duration(&self) -> Duration {
        Duration::from_millis(self.shard_analysis_interval_ms)
    }

    /// Parse options from JSON; missing fields take their defaults.
    ///
    /// ```
    /// use clusterdb::DatabaseOptions;
    ///
    /// let json = r#"{"shard_analysis_interval_ms": 250}"#;
    /// let opts = DatabaseOptions::from_json_str(json).unwrap();
    /// assert_eq!(opts.shard_analysis_interval_ms, 250);
    /// assert!(!opts.bootstrap_on_assign);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard_analysis_interval_ms == 0 {
            return Err(DbError::InvalidConfig(
                "shard_analysis_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-namespace options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamespaceOptions {
    pub retention_period_secs: u64,

    /// When false, shards count as bootstrapped as soon as they are assigned.
    pub needs_bootstrap: bool,
}

impl Default for NamespaceOptions {
    fn default() -> Self {
        Self {
            retention_period_secs: 2 * 24 * 60 * 60,
            needs_bootstrap: true,
        }
    }
}

/// Metadata describing a namespace to create in the storage engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceMetadata {
    pub id: String,
    #[serde(default)]
    pub options: NamespaceOptions,
}

impl NamespaceMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            options: NamespaceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: NamespaceOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates a namespace list: ids must be non-empty and unique.
    pub fn validate_all(namespaces: &[NamespaceMetadata]) -> Result<()> {
        let mut seen = HashSet::new();
        for ns in namespaces {
            if ns.id.trim().is_empty() {
                return Err(DbError::InvalidConfig(
                    "namespace id must not be empty".to_string(),
                ));
            }
            if !seen.insert(ns.id.as_str()) {
                return Err(DbError::InvalidConfig(format!(
                    "namespace '{}' declared more than once",
                    ns.id
                )));
            }
        }
        Ok(())
    }
}
