//! In-memory recording index backend.

use lodestone_core::error::{IndexError, IndexResult};
use lodestone_core::types::{EntityId, ShardId, TypeId};
use lodestone_core::work::WorkItem;
use lodestone_core::IndexBackend;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// One operation recorded against a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOp {
    /// Operation name (`add`, `update`, `delete`, `purge_all`,
    /// `commit`, `refresh`, `optimize`, `open`, `close`).
    pub name: &'static str,
    /// Entity id involved, when the operation carries one.
    pub entity_id: Option<EntityId>,
}

/// Recording in-memory backend with latency and failure injection.
///
/// Per-shard operation logs are kept separately so tests can assert
/// both what was applied and where. An optional artificial latency per
/// write makes shard-independence timing tests meaningful.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    ops: Mutex<BTreeMap<ShardId, Vec<RecordedOp>>>,
    failing_ids: Mutex<HashSet<u64>>,
    write_latency: Option<Duration>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that sleeps for `latency` on every write.
    #[must_use]
    pub fn with_write_latency(latency: Duration) -> Self {
        Self {
            write_latency: Some(latency),
            ..Self::default()
        }
    }

    /// Makes writes for one entity id fail recoverably.
    pub fn fail_entity(&self, id: u64) {
        self.failing_ids.lock().insert(id);
    }

    /// Returns the operations recorded against one shard, in order.
    #[must_use]
    pub fn ops(&self, shard: ShardId) -> Vec<RecordedOp> {
        self.ops.lock().get(&shard).cloned().unwrap_or_default()
    }

    /// Returns the sorted entity ids written (add/update) to one shard.
    #[must_use]
    pub fn written_ids(&self, shard: ShardId) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .ops(shard)
            .iter()
            .filter(|op| op.name == "add" || op.name == "update")
            .filter_map(|op| op.entity_id.map(EntityId::as_u64))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Returns the shards that recorded at least one operation.
    #[must_use]
    pub fn touched_shards(&self) -> Vec<ShardId> {
        self.ops.lock().keys().copied().collect()
    }

    fn record(&self, shard: ShardId, name: &'static str, entity_id: Option<EntityId>) {
        self.ops
            .lock()
            .entry(shard)
            .or_default()
            .push(RecordedOp { name, entity_id });
    }

    fn write(&self, shard: ShardId, name: &'static str, item: &WorkItem) -> IndexResult<()> {
        if let Some(id) = item.entity_id {
            if self.failing_ids.lock().contains(&id.as_u64()) {
                return Err(IndexError::backend(format!("injected failure for {id}")));
            }
        }
        if let Some(latency) = self.write_latency {
            std::thread::sleep(latency);
        }
        self.record(shard, name, item.entity_id);
        Ok(())
    }
}

impl IndexBackend for MemoryBackend {
    fn open_shard(&self, shard: ShardId) -> IndexResult<()> {
        self.record(shard, "open", None);
        Ok(())
    }

    fn close_shard(&self, shard: ShardId) -> IndexResult<()> {
        self.record(shard, "close", None);
        Ok(())
    }

    fn apply_add(&self, shard: ShardId, item: &WorkItem) -> IndexResult<()> {
        self.write(shard, "add", item)
    }

    fn apply_update(&self, shard: ShardId, item: &WorkItem) -> IndexResult<()> {
        self.write(shard, "update", item)
    }

    fn apply_delete(&self, shard: ShardId, item: &WorkItem) -> IndexResult<()> {
        self.write(shard, "delete", item)
    }

    fn purge_all(&self, shard: ShardId, _type_id: &TypeId) -> IndexResult<()> {
        self.record(shard, "purge_all", None);
        Ok(())
    }

    fn commit(&self, shard: ShardId) -> IndexResult<()> {
        self.record(shard, "commit", None);
        Ok(())
    }

    fn refresh(&self, shard: ShardId) -> IndexResult<()> {
        self.record(shard, "refresh", None);
        Ok(())
    }

    fn optimize(&self, shard: ShardId) -> IndexResult<()> {
        self.record(shard, "optimize", None);
        Ok(())
    }
}
