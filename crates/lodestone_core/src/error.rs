//! Error types for the indexing core.

use crate::types::ShardId;
use thiserror::Error;

/// Result type for indexing operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur in the indexing core.
///
/// The taxonomy distinguishes fatal failures (the process must not start,
/// or the remaining batch must be aborted) from per-item recoverable
/// failures (one document could not be built or applied; the batch
/// continues and the failure is reported to the monitor). Use
/// [`IndexError::is_fatal`] for the classification.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid dependency graph or sharding configuration.
    ///
    /// Raised at construction time; the process must not start with an
    /// invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description naming the offending type or property.
        message: String,
    },

    /// A document could not be built for one entity.
    ///
    /// Per-item and recoverable: the batch continues and the failure is
    /// aggregated into a structured report.
    #[error("mapping error for {type_id} field {field}: {message}")]
    Mapping {
        /// Entity type whose document failed to build.
        type_id: String,
        /// Field path that failed.
        field: String,
        /// Description of the failure.
        message: String,
    },

    /// A sharding strategy produced an unusable shard set.
    ///
    /// Fatal for the affected change: zero shards (or more than one for a
    /// per-id operation) is a programming or configuration bug.
    #[error("routing error: {message}")]
    Routing {
        /// Description of the routing failure.
        message: String,
    },

    /// The underlying index engine rejected an operation.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
        /// Whether the failure aborts the remaining batch.
        fatal: bool,
    },

    /// The shard's exclusive modification lock could not be acquired in time.
    ///
    /// Classified as a fatal batch failure.
    #[error("modification lock timeout on {shard}")]
    LockTimeout {
        /// The shard whose lock timed out.
        shard: ShardId,
    },

    /// Invalid index manager lifecycle transition.
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidState {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Work was submitted to a workspace that has been closed.
    #[error("workspace for {shard} is closed")]
    WorkspaceClosed {
        /// The shard whose workspace is closed.
        shard: ShardId,
    },
}

impl IndexError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a per-item mapping error.
    pub fn mapping(
        type_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Mapping {
            type_id: type_id.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a routing error.
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Creates a recoverable backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            fatal: false,
        }
    }

    /// Creates a fatal backend error (e.g. I/O failure on the store).
    pub fn backend_fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            fatal: true,
        }
    }

    /// Creates an invalid lifecycle transition error.
    pub fn invalid_state(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidState {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Returns true if this failure aborts the remaining batch or
    /// prevents the process from starting.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::Routing { .. }
            | Self::LockTimeout { .. }
            | Self::InvalidState { .. }
            | Self::WorkspaceClosed { .. } => true,
            Self::Backend { fatal, .. } => *fatal,
            Self::Mapping { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(IndexError::configuration("bad graph").is_fatal());
        assert!(IndexError::routing("zero shards").is_fatal());
        assert!(IndexError::backend_fatal("disk full").is_fatal());
        assert!(IndexError::LockTimeout {
            shard: ShardId::new(0)
        }
        .is_fatal());
        assert!(!IndexError::backend("transient").is_fatal());
        assert!(!IndexError::mapping("Person", "name", "null field").is_fatal());
    }

    #[test]
    fn error_display_names_offender() {
        let err = IndexError::mapping("Person", "address.city", "missing value");
        let text = err.to_string();
        assert!(text.contains("Person"));
        assert!(text.contains("address.city"));
    }
}
