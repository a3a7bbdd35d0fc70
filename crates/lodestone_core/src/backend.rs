//! Underlying index engine contract.
//!
//! The engine is an opaque store: the core never interprets documents
//! or index files, it only drives the engine's per-shard writer and
//! reader. Implementations must be `Send + Sync`; the workspace
//! guarantees that modifications to one shard are serialized under the
//! shard's exclusive lock.

use crate::error::IndexResult;
use crate::types::{ShardId, TypeId};
use crate::work::WorkItem;
use std::sync::Arc;

/// Contract with the underlying full-text index engine.
pub trait IndexBackend: Send + Sync {
    /// Opens one shard's store. Called at manager start; may fail fatally.
    fn open_shard(&self, shard: ShardId) -> IndexResult<()>;

    /// Closes one shard's store. Called at manager destroy.
    fn close_shard(&self, shard: ShardId) -> IndexResult<()>;

    /// Adds a freshly built document.
    fn apply_add(&self, shard: ShardId, item: &WorkItem) -> IndexResult<()>;

    /// Replaces the document for the item's entity.
    fn apply_update(&self, shard: ShardId, item: &WorkItem) -> IndexResult<()>;

    /// Removes the document keyed by the item's entity id (and tenant).
    fn apply_delete(&self, shard: ShardId, item: &WorkItem) -> IndexResult<()>;

    /// Removes every document of one entity type.
    fn purge_all(&self, shard: ShardId, type_id: &TypeId) -> IndexResult<()>;

    /// Makes applied work durable.
    fn commit(&self, shard: ShardId) -> IndexResult<()>;

    /// Makes applied work visible to readers.
    fn refresh(&self, shard: ShardId) -> IndexResult<()>;

    /// Compacts the shard's index.
    fn optimize(&self, shard: ShardId) -> IndexResult<()>;
}

/// Provides reader access to one shard and refreshes its visibility.
pub trait ReaderProvider: Send + Sync {
    /// Makes recently applied work visible to readers.
    fn refresh(&self) -> IndexResult<()>;

    /// Releases reader resources.
    fn close(&self) -> IndexResult<()>;
}

/// Reader provider that delegates visibility refreshes to the backend.
///
/// Both operating modes use this provider; they differ only in how
/// often refresh is driven (see the workspace's refresh strategy).
pub struct BackendReaderProvider {
    backend: Arc<dyn IndexBackend>,
    shard: ShardId,
}

impl BackendReaderProvider {
    /// Creates a provider over one shard of the backend.
    pub fn new(backend: Arc<dyn IndexBackend>, shard: ShardId) -> Self {
        Self { backend, shard }
    }
}

impl ReaderProvider for BackendReaderProvider {
    fn refresh(&self) -> IndexResult<()> {
        self.backend.refresh(self.shard)
    }

    fn close(&self) -> IndexResult<()> {
        Ok(())
    }
}
