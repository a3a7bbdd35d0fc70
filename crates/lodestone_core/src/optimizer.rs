//! Index compaction policy.

/// Policy deciding when a shard's index is compacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerStrategy {
    /// Compact after a number of applied operations or batches,
    /// whichever limit is crossed first. A limit of `None` never
    /// triggers on that counter.
    Incremental {
        /// Operations applied since the last compaction.
        max_operations: Option<u64>,
        /// Batches applied since the last compaction.
        max_transactions: Option<u64>,
    },
    /// Never compact automatically; only on explicit operator request.
    ExplicitOnly,
}

impl OptimizerStrategy {
    /// Returns true if the counters warrant a compaction.
    #[must_use]
    pub fn should_optimize(&self, operations_since: u64, transactions_since: u64) -> bool {
        match self {
            Self::ExplicitOnly => false,
            Self::Incremental {
                max_operations,
                max_transactions,
            } => {
                max_operations.is_some_and(|max| operations_since >= max)
                    || max_transactions.is_some_and(|max| transactions_since >= max)
            }
        }
    }
}

impl Default for OptimizerStrategy {
    fn default() -> Self {
        Self::ExplicitOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_only_never_triggers() {
        let strategy = OptimizerStrategy::ExplicitOnly;
        assert!(!strategy.should_optimize(u64::MAX, u64::MAX));
    }

    #[test]
    fn incremental_operation_limit() {
        let strategy = OptimizerStrategy::Incremental {
            max_operations: Some(100),
            max_transactions: None,
        };
        assert!(!strategy.should_optimize(99, 0));
        assert!(strategy.should_optimize(100, 0));
    }

    #[test]
    fn incremental_transaction_limit() {
        let strategy = OptimizerStrategy::Incremental {
            max_operations: None,
            max_transactions: Some(10),
        };
        assert!(!strategy.should_optimize(1000, 9));
        assert!(strategy.should_optimize(0, 10));
    }

    #[test]
    fn whichever_limit_first() {
        let strategy = OptimizerStrategy::Incremental {
            max_operations: Some(100),
            max_transactions: Some(10),
        };
        assert!(strategy.should_optimize(100, 0));
        assert!(strategy.should_optimize(0, 10));
        assert!(!strategy.should_optimize(99, 9));
    }
}
