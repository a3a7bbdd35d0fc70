//! Per-shard workspace and queue processor.
//!
//! One workspace exists per shard. It serializes writes to the shard's
//! underlying writer under an exclusive modification lock scoped to the
//! shard (never to the whole index set), which is what makes
//! cross-shard writes independent. Submission to a full queue blocks
//! the caller (backpressure, never dropped work).
//!
//! Reconfiguration swaps a versioned, copy-on-write config snapshot
//! under the same exclusive lock as writes, so a snapshot is never
//! observed half-updated and never interleaves with an in-flight batch.

use crate::backend::{IndexBackend, ReaderProvider};
use crate::config::{DocumentCommitStrategy, DocumentRefreshStrategy, IndexConfig};
use crate::error::{IndexError, IndexResult};
use crate::monitor::{FailureEntry, FailureMonitor};
use crate::optimizer::OptimizerStrategy;
use crate::types::ShardId;
use crate::work::{Operation, WorkItem};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Versioned, immutable workspace configuration snapshot.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Snapshot version, bumped on every reconfiguration.
    pub version: u64,
    /// Queue bound; enqueue blocks past it.
    pub max_queue_length: usize,
    /// Modification lock acquisition timeout.
    pub lock_timeout: Duration,
    /// Reader refresh strategy.
    pub refresh: DocumentRefreshStrategy,
    /// Commit strategy.
    pub commit: DocumentCommitStrategy,
    /// Compaction policy.
    pub optimizer: OptimizerStrategy,
}

impl WorkspaceConfig {
    /// Resolves a snapshot from the index config, filling unset
    /// strategies with the operating mode's defaults.
    ///
    /// Non-exclusive index use overrides the commit strategy: another
    /// process may open the writer between batches, so buffered work
    /// must be committed after every batch.
    #[must_use]
    pub fn resolve(
        config: &IndexConfig,
        default_refresh: DocumentRefreshStrategy,
        default_commit: DocumentCommitStrategy,
        version: u64,
    ) -> Self {
        let commit = if config.exclusive_index_use {
            config.commit.unwrap_or(default_commit)
        } else {
            DocumentCommitStrategy::Force
        };
        Self {
            version,
            max_queue_length: config.max_queue_length,
            lock_timeout: config.lock_timeout,
            refresh: config.refresh.unwrap_or(default_refresh),
            commit,
            optimizer: config.optimizer,
        }
    }
}

/// Outcome of applying one batch to a shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Items applied successfully.
    pub applied: usize,
    /// Items that failed recoverably and were reported to the monitor.
    pub failed: usize,
    /// Whether a compaction was triggered after the batch.
    pub optimized: bool,
}

/// Per-shard write serialization, batching and compaction coordination.
pub struct Workspace {
    shard: ShardId,
    backend: Arc<dyn IndexBackend>,
    reader: Arc<dyn ReaderProvider>,
    monitor: Arc<dyn FailureMonitor>,
    config: RwLock<Arc<WorkspaceConfig>>,
    queue: Mutex<VecDeque<WorkItem>>,
    space_available: Condvar,
    /// Exclusive modification lock; every write and every
    /// reconfiguration of this shard goes through it.
    write_lock: Mutex<()>,
    modifications: AtomicU64,
    ops_since_optimize: AtomicU64,
    batches_since_optimize: AtomicU64,
    closed: AtomicBool,
}

impl Workspace {
    /// Creates a workspace for one shard.
    pub fn new(
        shard: ShardId,
        backend: Arc<dyn IndexBackend>,
        reader: Arc<dyn ReaderProvider>,
        monitor: Arc<dyn FailureMonitor>,
        config: WorkspaceConfig,
    ) -> Self {
        Self {
            shard,
            backend,
            reader,
            monitor,
            config: RwLock::new(Arc::new(config)),
            queue: Mutex::new(VecDeque::new()),
            space_available: Condvar::new(),
            write_lock: Mutex::new(()),
            modifications: AtomicU64::new(0),
            ops_since_optimize: AtomicU64::new(0),
            batches_since_optimize: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the shard this workspace serializes.
    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Returns the monotonic modification counter.
    #[must_use]
    pub fn modification_count(&self) -> u64 {
        self.modifications.load(Ordering::Acquire)
    }

    /// Returns the current config snapshot version.
    #[must_use]
    pub fn config_version(&self) -> u64 {
        self.config.read().version
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Queues one work item, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::WorkspaceClosed`] once the workspace has
    /// been closed, including for callers that were blocked on a full
    /// queue when close happened.
    pub fn enqueue(&self, item: WorkItem) -> IndexResult<()> {
        let mut queue = self.queue.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(IndexError::WorkspaceClosed { shard: self.shard });
            }
            let max = self.config.read().max_queue_length;
            if queue.len() < max {
                break;
            }
            self.space_available.wait(&mut queue);
        }
        queue.push_back(item);
        Ok(())
    }

    /// Applies everything currently queued as one batch.
    pub fn drain(&self) -> IndexResult<BatchOutcome> {
        let items: Vec<WorkItem> = {
            let mut queue = self.queue.lock();
            let items = queue.drain(..).collect();
            self.space_available.notify_all();
            items
        };
        if items.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.apply_batch(items)
    }

    /// Applies one batch under the shard's exclusive modification lock.
    ///
    /// Per-item recoverable failures are reported to the monitor and
    /// the batch continues; a fatal failure (lock timeout, fatal
    /// backend error) aborts the remaining items and propagates.
    pub fn apply_batch(&self, items: Vec<WorkItem>) -> IndexResult<BatchOutcome> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::WorkspaceClosed { shard: self.shard });
        }
        self.apply_under_lock(items)
    }

    fn apply_under_lock(&self, items: Vec<WorkItem>) -> IndexResult<BatchOutcome> {
        let lock_timeout = self.config.read().lock_timeout;
        let Some(_guard) = self.write_lock.try_lock_for(lock_timeout) else {
            return Err(IndexError::LockTimeout { shard: self.shard });
        };
        // Snapshot is stable for the whole batch: reconfiguration goes
        // through the same lock we now hold.
        let config = Arc::clone(&self.config.read());

        let mut outcome = BatchOutcome::default();
        for item in &items {
            match self.apply_one(item) {
                Ok(()) => {
                    outcome.applied += 1;
                    self.modifications.fetch_add(1, Ordering::AcqRel);
                    self.ops_since_optimize.fetch_add(1, Ordering::AcqRel);
                }
                Err(err) if !err.is_fatal() => {
                    warn!(shard = %self.shard, error = %err, "work item failed, batch continues");
                    self.monitor.on_failure(FailureEntry::from_error(
                        item.type_id.clone(),
                        item.entity_id,
                        &err,
                    ));
                    outcome.failed += 1;
                }
                Err(err) => {
                    warn!(shard = %self.shard, error = %err, "fatal failure, aborting batch");
                    return Err(err);
                }
            }
        }
        let batches = self.batches_since_optimize.fetch_add(1, Ordering::AcqRel) + 1;

        let ops = self.ops_since_optimize.load(Ordering::Acquire);
        if config.optimizer.should_optimize(ops, batches) {
            debug!(shard = %self.shard, ops, batches, "optimizer threshold reached");
            self.backend.optimize(self.shard)?;
            self.reset_optimizer_counters();
            outcome.optimized = true;
        }
        if config.commit == DocumentCommitStrategy::Force {
            self.backend.commit(self.shard)?;
        }
        if config.refresh == DocumentRefreshStrategy::Force {
            self.reader.refresh()?;
        }
        debug!(
            shard = %self.shard,
            applied = outcome.applied,
            failed = outcome.failed,
            "batch applied"
        );
        Ok(outcome)
    }

    /// Compacts the shard on explicit operator request.
    pub fn request_optimize(&self) -> IndexResult<()> {
        let lock_timeout = self.config.read().lock_timeout;
        let Some(_guard) = self.write_lock.try_lock_for(lock_timeout) else {
            return Err(IndexError::LockTimeout { shard: self.shard });
        };
        self.backend.optimize(self.shard)?;
        self.reset_optimizer_counters();
        Ok(())
    }

    /// Swaps in a new config snapshot under the modification lock.
    ///
    /// Observed before the next queue drain; never interleaves with an
    /// in-flight batch.
    pub fn reconfigure(&self, mut config: WorkspaceConfig) -> IndexResult<()> {
        let lock_timeout = self.config.read().lock_timeout;
        let Some(_guard) = self.write_lock.try_lock_for(lock_timeout) else {
            return Err(IndexError::LockTimeout { shard: self.shard });
        };
        let current = self.config.read().version;
        if config.version <= current {
            config.version = current + 1;
        }
        debug!(shard = %self.shard, version = config.version, "workspace reconfigured");
        // Swap and wakeup happen under the queue lock: a producer between
        // its capacity check and its wait must not miss a grown bound.
        let _queue = self.queue.lock();
        *self.config.write() = Arc::new(config);
        self.space_available.notify_all();
        Ok(())
    }

    /// Drains pending work, then rejects all further submissions.
    ///
    /// The final drain goes through the normal batch path, so the
    /// configured commit and refresh strategies apply to it.
    pub fn close(&self) -> IndexResult<()> {
        let items: Vec<WorkItem> = {
            let mut queue = self.queue.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            // Flag swap and wakeup happen under the queue lock: a producer
            // between its capacity check and its wait must not miss the
            // close.
            self.space_available.notify_all();
            queue.drain(..).collect()
        };
        if items.is_empty() {
            return Ok(());
        }
        // Closed flag is set; bypass apply_batch's closed check.
        self.apply_under_lock(items)?;
        Ok(())
    }

    fn apply_one(&self, item: &WorkItem) -> IndexResult<()> {
        match item.operation {
            Operation::Add => self.backend.apply_add(self.shard, item),
            Operation::Update => self.backend.apply_update(self.shard, item),
            Operation::Delete | Operation::Purge => self.backend.apply_delete(self.shard, item),
            Operation::PurgeAll => {
                let Some(type_id) = &item.type_id else {
                    return Err(IndexError::backend("purge-all item carries no entity type"));
                };
                self.backend.purge_all(self.shard, type_id)
            }
            Operation::Optimize => {
                self.backend.optimize(self.shard)?;
                self.reset_optimizer_counters();
                Ok(())
            }
        }
    }

    fn reset_optimizer_counters(&self) {
        self.ops_since_optimize.store(0, Ordering::Release);
        self.batches_since_optimize.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::CollectingMonitor;
    use crate::types::{EntityId, TypeId};
    use crate::work::Document;
    use parking_lot::Mutex as PlMutex;
    use std::thread;

    /// Backend stub recording operation names, with optional failure
    /// injection by entity id.
    #[derive(Default)]
    struct StubBackend {
        ops: PlMutex<Vec<&'static str>>,
        fail_id: Option<(u64, bool)>,
    }

    impl StubBackend {
        fn failing(id: u64, fatal: bool) -> Self {
            Self {
                ops: PlMutex::new(Vec::new()),
                fail_id: Some((id, fatal)),
            }
        }

        fn record(&self, op: &'static str, item: Option<&WorkItem>) -> IndexResult<()> {
            if let (Some((fail_id, fatal)), Some(item)) = (self.fail_id, item) {
                if item.entity_id.map(EntityId::as_u64) == Some(fail_id) {
                    return if fatal {
                        Err(IndexError::backend_fatal("injected"))
                    } else {
                        Err(IndexError::backend("injected"))
                    };
                }
            }
            self.ops.lock().push(op);
            Ok(())
        }
    }

    impl IndexBackend for StubBackend {
        fn open_shard(&self, _: ShardId) -> IndexResult<()> {
            self.record("open", None)
        }
        fn close_shard(&self, _: ShardId) -> IndexResult<()> {
            self.record("close", None)
        }
        fn apply_add(&self, _: ShardId, item: &WorkItem) -> IndexResult<()> {
            self.record("add", Some(item))
        }
        fn apply_update(&self, _: ShardId, item: &WorkItem) -> IndexResult<()> {
            self.record("update", Some(item))
        }
        fn apply_delete(&self, _: ShardId, item: &WorkItem) -> IndexResult<()> {
            self.record("delete", Some(item))
        }
        fn purge_all(&self, _: ShardId, _: &TypeId) -> IndexResult<()> {
            self.record("purge_all", None)
        }
        fn commit(&self, _: ShardId) -> IndexResult<()> {
            self.record("commit", None)
        }
        fn refresh(&self, _: ShardId) -> IndexResult<()> {
            self.record("refresh", None)
        }
        fn optimize(&self, _: ShardId) -> IndexResult<()> {
            self.record("optimize", None)
        }
    }

    struct StubReader;
    impl ReaderProvider for StubReader {
        fn refresh(&self) -> IndexResult<()> {
            Ok(())
        }
        fn close(&self) -> IndexResult<()> {
            Ok(())
        }
    }

    fn snapshot(max_queue: usize) -> WorkspaceConfig {
        WorkspaceConfig {
            version: 1,
            max_queue_length: max_queue,
            lock_timeout: Duration::from_millis(200),
            refresh: DocumentRefreshStrategy::None,
            commit: DocumentCommitStrategy::None,
            optimizer: OptimizerStrategy::ExplicitOnly,
        }
    }

    fn workspace_with(backend: StubBackend, config: WorkspaceConfig) -> (Workspace, Arc<StubBackend>, Arc<CollectingMonitor>) {
        let backend = Arc::new(backend);
        let monitor = Arc::new(CollectingMonitor::new());
        let reader = Arc::new(StubReader);
        let ws = Workspace::new(
            ShardId::new(0),
            Arc::clone(&backend) as Arc<dyn IndexBackend>,
            reader,
            Arc::clone(&monitor) as Arc<dyn FailureMonitor>,
            config,
        );
        (ws, backend, monitor)
    }

    fn update_item(id: u64) -> WorkItem {
        WorkItem::update(Document::new("Person", EntityId::new(id), b"d".to_vec()))
    }

    #[test]
    fn applies_batch_and_counts_modifications() {
        let (ws, backend, _) = workspace_with(StubBackend::default(), snapshot(10));
        let outcome = ws
            .apply_batch(vec![update_item(1), update_item(2)])
            .unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(ws.modification_count(), 2);
        assert_eq!(backend.ops.lock().as_slice(), ["update", "update"]);
    }

    #[test]
    fn recoverable_failure_continues_batch() {
        let (ws, backend, monitor) =
            workspace_with(StubBackend::failing(2, false), snapshot(10));
        let outcome = ws
            .apply_batch(vec![update_item(1), update_item(2), update_item(3)])
            .unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(monitor.len(), 1);
        assert_eq!(backend.ops.lock().len(), 2);
    }

    #[test]
    fn fatal_failure_aborts_remaining_items() {
        let (ws, backend, _) = workspace_with(StubBackend::failing(2, true), snapshot(10));
        let err = ws
            .apply_batch(vec![update_item(1), update_item(2), update_item(3)])
            .unwrap_err();
        assert!(err.is_fatal());
        // Item 3 was never applied.
        assert_eq!(backend.ops.lock().as_slice(), ["update"]);
    }

    #[test]
    fn incremental_optimizer_triggers_after_limit() {
        let mut config = snapshot(10);
        config.optimizer = OptimizerStrategy::Incremental {
            max_operations: Some(3),
            max_transactions: None,
        };
        let (ws, backend, _) = workspace_with(StubBackend::default(), config);

        let first = ws.apply_batch(vec![update_item(1), update_item(2)]).unwrap();
        assert!(!first.optimized);
        let second = ws.apply_batch(vec![update_item(3)]).unwrap();
        assert!(second.optimized);
        assert!(backend.ops.lock().contains(&"optimize"));

        // Counters reset after compaction.
        let third = ws.apply_batch(vec![update_item(4)]).unwrap();
        assert!(!third.optimized);
    }

    #[test]
    fn force_commit_and_refresh_after_batch() {
        let mut config = snapshot(10);
        config.commit = DocumentCommitStrategy::Force;
        config.refresh = DocumentRefreshStrategy::Force;
        let (ws, backend, _) = workspace_with(StubBackend::default(), config);
        ws.apply_batch(vec![update_item(1)]).unwrap();
        assert!(backend.ops.lock().contains(&"commit"));
    }

    #[test]
    fn enqueue_blocks_on_full_queue_until_drain() {
        let (ws, _, _) = workspace_with(StubBackend::default(), snapshot(2));
        let ws = Arc::new(ws);
        ws.enqueue(update_item(1)).unwrap();
        ws.enqueue(update_item(2)).unwrap();

        let producer = {
            let ws = Arc::clone(&ws);
            thread::spawn(move || ws.enqueue(update_item(3)))
        };
        // Give the producer a moment to block on the full queue.
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        ws.drain().unwrap();
        producer.join().unwrap().unwrap();
        assert_eq!(ws.pending(), 1);
    }

    #[test]
    fn close_rejects_new_work_and_drains_pending() {
        let (ws, backend, _) = workspace_with(StubBackend::default(), snapshot(10));
        ws.enqueue(update_item(1)).unwrap();
        ws.close().unwrap();
        assert_eq!(backend.ops.lock().as_slice(), ["update"]);
        assert_eq!(ws.modification_count(), 1);

        let err = ws.enqueue(update_item(2)).unwrap_err();
        assert!(matches!(err, IndexError::WorkspaceClosed { .. }));
        // Idempotent.
        ws.close().unwrap();
    }

    #[test]
    fn close_commits_drained_work_under_force_commit() {
        let mut config = snapshot(10);
        config.commit = DocumentCommitStrategy::Force;
        let (ws, backend, _) = workspace_with(StubBackend::default(), config);
        ws.enqueue(update_item(1)).unwrap();
        ws.close().unwrap();
        assert_eq!(backend.ops.lock().as_slice(), ["update", "commit"]);
    }

    #[test]
    fn close_wakes_blocked_enqueuer() {
        let (ws, _, _) = workspace_with(StubBackend::default(), snapshot(1));
        let ws = Arc::new(ws);
        ws.enqueue(update_item(1)).unwrap();

        let producer = {
            let ws = Arc::clone(&ws);
            thread::spawn(move || ws.enqueue(update_item(2)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        ws.close().unwrap();
        let err = producer.join().unwrap().unwrap_err();
        assert!(matches!(err, IndexError::WorkspaceClosed { .. }));
    }

    #[test]
    fn reconfigure_wakes_blocked_enqueuer() {
        let (ws, _, _) = workspace_with(StubBackend::default(), snapshot(1));
        let ws = Arc::new(ws);
        ws.enqueue(update_item(1)).unwrap();

        let producer = {
            let ws = Arc::clone(&ws);
            thread::spawn(move || ws.enqueue(update_item(2)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        ws.reconfigure(snapshot(10)).unwrap();
        producer.join().unwrap().unwrap();
        assert_eq!(ws.pending(), 2);
    }

    #[test]
    fn non_exclusive_use_forces_commit() {
        let config = IndexConfig::new("books").exclusive_index_use(false);
        let resolved = WorkspaceConfig::resolve(
            &config,
            DocumentRefreshStrategy::None,
            DocumentCommitStrategy::None,
            1,
        );
        assert_eq!(resolved.commit, DocumentCommitStrategy::Force);

        let exclusive = IndexConfig::new("books");
        let resolved = WorkspaceConfig::resolve(
            &exclusive,
            DocumentRefreshStrategy::None,
            DocumentCommitStrategy::None,
            1,
        );
        assert_eq!(resolved.commit, DocumentCommitStrategy::None);
    }

    #[test]
    fn reconfigure_bumps_version_and_is_observed() {
        let (ws, _, _) = workspace_with(StubBackend::default(), snapshot(2));
        assert_eq!(ws.config_version(), 1);
        let mut next = snapshot(100);
        next.version = 0; // stale version gets corrected
        ws.reconfigure(next).unwrap();
        assert_eq!(ws.config_version(), 2);
        for i in 0..50 {
            ws.enqueue(update_item(i)).unwrap();
        }
        assert_eq!(ws.pending(), 50);
    }

    #[test]
    fn explicit_optimize_request() {
        let (ws, backend, _) = workspace_with(StubBackend::default(), snapshot(10));
        ws.request_optimize().unwrap();
        assert!(backend.ops.lock().contains(&"optimize"));
    }
}
