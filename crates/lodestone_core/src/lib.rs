//! # Lodestone Core
//!
//! Reindexing resolution and sharded index write pipeline.
//!
//! This crate provides:
//! - Dependency graph over entity types (embeddings, derived
//!   properties, containment backrefs)
//! - Reindexing resolver: changed entity → exact set of index roots to
//!   rebuild, bounded by per-edge depth budgets
//! - Work builder turning resolved roots into index work items
//! - Deterministic sharding router (not-sharded, id-hash, custom)
//! - Per-shard workspaces serializing writes under an exclusive
//!   modification lock with bounded-queue backpressure
//! - Index manager lifecycle and committed / near-real-time operating
//!   modes
//! - A coordinator driving the full change pipeline
//!
//! ## Key Invariants
//!
//! - Resolution is exact: a root is rebuilt iff some path within the
//!   declared depth budgets connects it to the change
//! - Routing is deterministic across calls and process restarts
//! - Writes to one shard are serialized; writes to distinct shards are
//!   independent
//! - A full queue blocks the producer; work is never dropped
//! - Per-item failures are reported, never silently swallowed

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod manager;
pub mod monitor;
pub mod optimizer;
pub mod resolver;
pub mod routing;
pub mod types;
pub mod work;
pub mod workspace;

pub use backend::{BackendReaderProvider, IndexBackend, ReaderProvider};
pub use config::{
    DocumentCommitStrategy, DocumentRefreshStrategy, IndexConfig, OperatingModeKind,
    DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_QUEUE_LENGTH,
};
pub use coordinator::{ChangeEvent, EnqueueReport, IndexCoordinator};
pub use error::{IndexError, IndexResult};
pub use graph::{
    DependencyGraph, Depth, EdgeKind, EmbeddedDef, GraphBuilder, InverseEdge, Multiplicity,
    PropertyEdge, ReindexPolicy, TypeDef, TypeNode,
};
pub use manager::{CommittedMode, IndexManager, ManagerState, NearRealTimeMode, OperatingMode};
pub use monitor::{CollectingMonitor, FailureEntry, FailureMonitor, FailureReport, NullMonitor};
pub use optimizer::OptimizerStrategy;
pub use resolver::{AssociationAccess, ChangedEntity, Resolver};
pub use routing::{Router, ShardAssignment, ShardSelector, ShardingStrategy};
pub use types::{EntityId, EntityRef, PropertyPath, RoutingKey, ShardId, TenantId, TypeId};
pub use work::{Document, DocumentBuilder, Operation, WorkBuilder, WorkItem};
pub use workspace::{BatchOutcome, Workspace, WorkspaceConfig};
