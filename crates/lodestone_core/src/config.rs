//! Per-index configuration.
//!
//! Configuration comes either from the builder API or from a property
//! map (`key -> string value`) per index, as handed over by the host
//! application's configuration layer. Malformed values fail fast at
//! startup with the offending key named; unrecognized keys are ignored
//! for forward compatibility.

use crate::error::{IndexError, IndexResult};
use crate::optimizer::OptimizerStrategy;
use crate::routing::ShardingStrategy;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default bound for a shard workspace queue.
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 1000;

/// Default timeout for acquiring a shard's modification lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// When reader visibility is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRefreshStrategy {
    /// Refresh only on the configured interval or schedule.
    None,
    /// Refresh synchronously after each applied batch.
    Force,
}

/// When applied work is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCommitStrategy {
    /// Leave work buffered in the writer.
    None,
    /// Commit synchronously after each applied batch.
    Force,
}

/// Which index manager mode a shard starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingModeKind {
    /// Readers only observe committed, explicitly refreshed state.
    Committed,
    /// Readers may observe writer-buffered, uncommitted state.
    NearRealTime,
}

/// Configuration for one logical index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Name of the logical index.
    pub index_name: String,
    /// Shard selection strategy.
    pub sharding: ShardingStrategy,
    /// Whether this process holds the index writer exclusively. When
    /// `false`, every batch is committed so the writer can be handed
    /// over between batches.
    pub exclusive_index_use: bool,
    /// Operating mode chosen at manager start.
    pub mode: OperatingModeKind,
    /// Reader refresh strategy; `None` defers to the mode's default.
    pub refresh: Option<DocumentRefreshStrategy>,
    /// Commit strategy; `None` defers to the mode's default.
    pub commit: Option<DocumentCommitStrategy>,
    /// Bound of each shard workspace queue.
    pub max_queue_length: usize,
    /// Timeout for acquiring a shard's modification lock.
    pub lock_timeout: Duration,
    /// Compaction policy.
    pub optimizer: OptimizerStrategy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_name: "default".to_string(),
            sharding: ShardingStrategy::NotSharded,
            exclusive_index_use: true,
            mode: OperatingModeKind::Committed,
            refresh: None,
            commit: None,
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            optimizer: OptimizerStrategy::ExplicitOnly,
        }
    }
}

impl IndexConfig {
    /// Creates a configuration with default values for an index.
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            ..Self::default()
        }
    }

    /// Sets the sharding strategy.
    #[must_use]
    pub fn sharding(mut self, strategy: ShardingStrategy) -> Self {
        self.sharding = strategy;
        self
    }

    /// Sets whether this process holds the index writer exclusively.
    #[must_use]
    pub fn exclusive_index_use(mut self, exclusive: bool) -> Self {
        self.exclusive_index_use = exclusive;
        self
    }

    /// Sets the operating mode.
    #[must_use]
    pub fn mode(mut self, mode: OperatingModeKind) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the reader refresh strategy.
    #[must_use]
    pub fn refresh(mut self, strategy: DocumentRefreshStrategy) -> Self {
        self.refresh = Some(strategy);
        self
    }

    /// Sets the commit strategy.
    #[must_use]
    pub fn commit(mut self, strategy: DocumentCommitStrategy) -> Self {
        self.commit = Some(strategy);
        self
    }

    /// Sets the workspace queue bound.
    #[must_use]
    pub fn max_queue_length(mut self, length: usize) -> Self {
        self.max_queue_length = length;
        self
    }

    /// Sets the modification lock timeout.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the compaction policy.
    #[must_use]
    pub fn optimizer(mut self, strategy: OptimizerStrategy) -> Self {
        self.optimizer = strategy;
        self
    }

    /// Parses a configuration from a per-index property map.
    ///
    /// Recognized keys (non-exhaustive; unknown keys are ignored):
    /// `sharding_strategy`, `sharding_strategy.nbr_of_shards`,
    /// `exclusive_index_use`, `indexmanager`, `reader.strategy`,
    /// `worker.max_queue_length`, `worker.commit`,
    /// `optimizer.operation_limit.max`,
    /// `optimizer.transaction_limit.max`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] naming the offending key
    /// for any malformed or unrecognized value.
    pub fn from_properties(
        index_name: impl Into<String>,
        properties: &BTreeMap<String, String>,
    ) -> IndexResult<Self> {
        let mut config = Self::new(index_name);

        let shard_count = match properties.get("sharding_strategy.nbr_of_shards") {
            Some(value) => parse_u32("sharding_strategy.nbr_of_shards", value)?,
            None => 1,
        };
        if let Some(value) = properties.get("sharding_strategy") {
            config.sharding = match value.as_str() {
                "not-sharded" => ShardingStrategy::NotSharded,
                "id-hash" => ShardingStrategy::IdHash { shard_count },
                other => {
                    return Err(IndexError::configuration(format!(
                        "sharding_strategy: unknown strategy {other:?} \
                         (expected \"not-sharded\" or \"id-hash\")"
                    )))
                }
            };
        } else if shard_count > 1 {
            config.sharding = ShardingStrategy::IdHash { shard_count };
        }

        if let Some(value) = properties.get("exclusive_index_use") {
            config.exclusive_index_use = parse_bool("exclusive_index_use", value)?;
        }
        if let Some(value) = properties.get("indexmanager") {
            config.mode = match value.as_str() {
                "committed" => OperatingModeKind::Committed,
                "near-real-time" => OperatingModeKind::NearRealTime,
                other => {
                    return Err(IndexError::configuration(format!(
                        "indexmanager: unknown implementation {other:?} \
                         (expected \"committed\" or \"near-real-time\")"
                    )))
                }
            };
        }
        if let Some(value) = properties.get("reader.strategy") {
            config.refresh = Some(match value.as_str() {
                "none" => DocumentRefreshStrategy::None,
                "force" => DocumentRefreshStrategy::Force,
                other => {
                    return Err(IndexError::configuration(format!(
                        "reader.strategy: unknown strategy {other:?}"
                    )))
                }
            });
        }
        if let Some(value) = properties.get("worker.commit") {
            config.commit = Some(match value.as_str() {
                "none" => DocumentCommitStrategy::None,
                "force" => DocumentCommitStrategy::Force,
                other => {
                    return Err(IndexError::configuration(format!(
                        "worker.commit: unknown strategy {other:?}"
                    )))
                }
            });
        }
        if let Some(value) = properties.get("worker.max_queue_length") {
            let length = parse_u32("worker.max_queue_length", value)?;
            if length == 0 {
                return Err(IndexError::configuration(
                    "worker.max_queue_length must be a positive integer",
                ));
            }
            config.max_queue_length = length as usize;
        }

        let max_operations = properties
            .get("optimizer.operation_limit.max")
            .map(|v| parse_u64("optimizer.operation_limit.max", v))
            .transpose()?;
        let max_transactions = properties
            .get("optimizer.transaction_limit.max")
            .map(|v| parse_u64("optimizer.transaction_limit.max", v))
            .transpose()?;
        if max_operations.is_some() || max_transactions.is_some() {
            config.optimizer = OptimizerStrategy::Incremental {
                max_operations,
                max_transactions,
            };
        }

        Ok(config)
    }

    /// Returns the shard count implied by the sharding strategy.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.sharding.shard_count()
    }
}

fn parse_bool(key: &str, value: &str) -> IndexResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(IndexError::configuration(format!(
            "{key}: expected \"true\" or \"false\", got {other:?}"
        ))),
    }
}

fn parse_u32(key: &str, value: &str) -> IndexResult<u32> {
    value.parse().map_err(|_| {
        IndexError::configuration(format!("{key}: expected an integer, got {value:?}"))
    })
}

fn parse_u64(key: &str, value: &str) -> IndexResult<u64> {
    value.parse().map_err(|_| {
        IndexError::configuration(format!("{key}: expected an integer, got {value:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn default_config() {
        let config = IndexConfig::default();
        assert!(config.exclusive_index_use);
        assert_eq!(config.max_queue_length, DEFAULT_MAX_QUEUE_LENGTH);
        assert_eq!(config.mode, OperatingModeKind::Committed);
        assert_eq!(config.shard_count(), 1);
    }

    #[test]
    fn parses_recognized_keys() {
        let config = IndexConfig::from_properties(
            "books",
            &props(&[
                ("sharding_strategy", "id-hash"),
                ("sharding_strategy.nbr_of_shards", "4"),
                ("exclusive_index_use", "false"),
                ("indexmanager", "near-real-time"),
                ("reader.strategy", "force"),
                ("worker.max_queue_length", "64"),
                ("optimizer.operation_limit.max", "1000"),
                ("optimizer.transaction_limit.max", "100"),
            ]),
        )
        .unwrap();

        assert_eq!(config.index_name, "books");
        assert_eq!(config.shard_count(), 4);
        assert!(!config.exclusive_index_use);
        assert_eq!(config.mode, OperatingModeKind::NearRealTime);
        assert_eq!(config.refresh, Some(DocumentRefreshStrategy::Force));
        assert_eq!(config.max_queue_length, 64);
        assert_eq!(
            config.optimizer,
            OptimizerStrategy::Incremental {
                max_operations: Some(1000),
                max_transactions: Some(100),
            }
        );
    }

    #[test]
    fn unknown_strategy_names_the_key() {
        let err = IndexConfig::from_properties(
            "books",
            &props(&[("sharding_strategy", "round-robin")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("sharding_strategy"));
    }

    #[test]
    fn malformed_number_names_the_key() {
        let err = IndexConfig::from_properties(
            "books",
            &props(&[("worker.max_queue_length", "lots")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("worker.max_queue_length"));
    }

    #[test]
    fn zero_queue_length_rejected() {
        let err = IndexConfig::from_properties(
            "books",
            &props(&[("worker.max_queue_length", "0")]),
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::Configuration { .. }));
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let config = IndexConfig::from_properties(
            "books",
            &props(&[("some.future.key", "whatever")]),
        )
        .unwrap();
        assert_eq!(config.index_name, "books");
    }

    #[test]
    fn shard_count_alone_implies_id_hash() {
        let config = IndexConfig::from_properties(
            "books",
            &props(&[("sharding_strategy.nbr_of_shards", "3")]),
        )
        .unwrap();
        assert_eq!(config.shard_count(), 3);
        assert!(matches!(
            config.sharding,
            ShardingStrategy::IdHash { shard_count: 3 }
        ));
    }
}
