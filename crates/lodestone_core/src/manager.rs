//! Per-shard index manager lifecycle.
//!
//! One manager owns one shard's underlying store, reader provider and
//! workspace. The lifecycle is a strict state machine:
//! `Uninitialized → Initialized → Started → Destroyed` (terminal).
//! `initialize` wires configuration with no I/O; `start` opens the
//! store and reader (may fail fatally); `destroy` drains and releases
//! everything, idempotently tolerant of partial starts.
//!
//! Committed and near-real-time operation share one manager type; the
//! difference is a [`OperatingMode`] capability supplying the reader
//! provider and strategy defaults, not an inheritance hierarchy.

use crate::backend::{BackendReaderProvider, IndexBackend, ReaderProvider};
use crate::config::{
    DocumentCommitStrategy, DocumentRefreshStrategy, IndexConfig, OperatingModeKind,
};
use crate::error::{IndexError, IndexResult};
use crate::monitor::FailureMonitor;
use crate::types::ShardId;
use crate::workspace::{Workspace, WorkspaceConfig};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle state of an index manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Created, not yet configured.
    Uninitialized,
    /// Configuration wired; no I/O performed yet.
    Initialized,
    /// Store and reader open; accepting work.
    Started,
    /// Terminal; all resources released.
    Destroyed,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Capability distinguishing committed from near-real-time operation.
///
/// Both modes implement the same external contract; the mode only
/// supplies the reader provider and the default refresh/commit
/// strategies applied when the configuration leaves them unset.
pub trait OperatingMode: Send + Sync {
    /// Mode name for diagnostics.
    fn name(&self) -> &'static str;

    /// Default reader refresh strategy.
    fn default_refresh(&self) -> DocumentRefreshStrategy;

    /// Default commit strategy.
    fn default_commit(&self) -> DocumentCommitStrategy;

    /// Creates the reader provider for one shard.
    fn create_reader_provider(
        &self,
        backend: Arc<dyn IndexBackend>,
        shard: ShardId,
    ) -> Arc<dyn ReaderProvider> {
        Arc::new(BackendReaderProvider::new(backend, shard))
    }
}

/// Readers only observe committed, explicitly refreshed state.
///
/// Refresh is a discrete operation with its own cost, decoupled from
/// every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommittedMode;

impl OperatingMode for CommittedMode {
    fn name(&self) -> &'static str {
        "committed"
    }

    fn default_refresh(&self) -> DocumentRefreshStrategy {
        DocumentRefreshStrategy::None
    }

    fn default_commit(&self) -> DocumentCommitStrategy {
        DocumentCommitStrategy::Force
    }
}

/// Readers may observe writer-buffered, uncommitted state.
///
/// Trades a small durability window (uncommitted data is lost on crash)
/// for lower write latency. Unsuitable for replicated or clustered
/// backends: buffered state has no cross-process visibility.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearRealTimeMode;

impl OperatingMode for NearRealTimeMode {
    fn name(&self) -> &'static str {
        "near-real-time"
    }

    fn default_refresh(&self) -> DocumentRefreshStrategy {
        DocumentRefreshStrategy::Force
    }

    fn default_commit(&self) -> DocumentCommitStrategy {
        DocumentCommitStrategy::None
    }
}

impl OperatingModeKind {
    /// Instantiates the mode capability for this kind.
    #[must_use]
    pub fn instantiate(self) -> Box<dyn OperatingMode> {
        match self {
            Self::Committed => Box::new(CommittedMode),
            Self::NearRealTime => Box::new(NearRealTimeMode),
        }
    }
}

/// Owns one shard's store, reader provider and workspace.
pub struct IndexManager {
    shard: ShardId,
    state: RwLock<ManagerState>,
    config: RwLock<Option<Arc<IndexConfig>>>,
    backend: RwLock<Option<Arc<dyn IndexBackend>>>,
    reader: RwLock<Option<Arc<dyn ReaderProvider>>>,
    workspace: RwLock<Option<Arc<Workspace>>>,
    config_version: AtomicU64,
}

// Manual impl: the backend, reader and mode handles are trait objects
// without Debug.
impl fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexManager")
            .field("shard", &self.shard)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl IndexManager {
    /// Creates an uninitialized manager for one shard.
    #[must_use]
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            state: RwLock::new(ManagerState::Uninitialized),
            config: RwLock::new(None),
            backend: RwLock::new(None),
            reader: RwLock::new(None),
            workspace: RwLock::new(None),
            config_version: AtomicU64::new(1),
        }
    }

    /// Returns the shard this manager owns.
    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    /// Wires configuration. Performs no I/O.
    pub fn initialize(&self, config: IndexConfig) -> IndexResult<()> {
        let mut state = self.state.write();
        if *state != ManagerState::Uninitialized {
            return Err(IndexError::invalid_state(
                state.to_string(),
                ManagerState::Initialized.to_string(),
            ));
        }
        *self.config.write() = Some(Arc::new(config));
        *state = ManagerState::Initialized;
        debug!(shard = %self.shard, "index manager initialized");
        Ok(())
    }

    /// Opens the shard's store and reader provider and creates the
    /// workspace. A failure here is fatal for the shard.
    pub fn start(
        &self,
        backend: Arc<dyn IndexBackend>,
        monitor: Arc<dyn FailureMonitor>,
    ) -> IndexResult<()> {
        let mut state = self.state.write();
        if *state != ManagerState::Initialized {
            return Err(IndexError::invalid_state(
                state.to_string(),
                ManagerState::Started.to_string(),
            ));
        }
        let config = self
            .config
            .read()
            .clone()
            .ok_or_else(|| IndexError::invalid_state("unconfigured", "started"))?;
        let mode = config.mode.instantiate();

        backend.open_shard(self.shard)?;
        let reader = mode.create_reader_provider(Arc::clone(&backend), self.shard);
        let snapshot = WorkspaceConfig::resolve(
            &config,
            mode.default_refresh(),
            mode.default_commit(),
            self.config_version.load(Ordering::Acquire),
        );
        let workspace = Arc::new(Workspace::new(
            self.shard,
            Arc::clone(&backend),
            Arc::clone(&reader),
            monitor,
            snapshot,
        ));

        info!(shard = %self.shard, mode = mode.name(), "index manager started");
        *self.backend.write() = Some(backend);
        *self.reader.write() = Some(reader);
        *self.workspace.write() = Some(workspace);
        *state = ManagerState::Started;
        Ok(())
    }

    /// Returns the shard's workspace.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidState`] unless the manager is
    /// started.
    pub fn workspace(&self) -> IndexResult<Arc<Workspace>> {
        if self.state() != ManagerState::Started {
            return Err(IndexError::invalid_state(
                self.state().to_string(),
                ManagerState::Started.to_string(),
            ));
        }
        self.workspace
            .read()
            .clone()
            .ok_or_else(|| IndexError::invalid_state("started", "workspace missing"))
    }

    /// Applies a configuration change without restarting the manager.
    ///
    /// Builds a new copy-on-write config snapshot and hands it to the
    /// workspace, which swaps it under the shard's exclusive
    /// modification lock. The shard count must not change.
    pub fn reconfigure(&self, mutate: impl FnOnce(&mut IndexConfig)) -> IndexResult<()> {
        if self.state() != ManagerState::Started {
            return Err(IndexError::invalid_state(
                self.state().to_string(),
                "reconfigured".to_string(),
            ));
        }
        let current = self
            .config
            .read()
            .clone()
            .ok_or_else(|| IndexError::invalid_state("unconfigured", "reconfigured"))?;
        let mut next = (*current).clone();
        mutate(&mut next);
        if next.shard_count() != current.shard_count() {
            return Err(IndexError::configuration(format!(
                "reconfiguration must not change the shard count ({} -> {})",
                current.shard_count(),
                next.shard_count()
            )));
        }

        let mode = next.mode.instantiate();
        let version = self.config_version.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = WorkspaceConfig::resolve(
            &next,
            mode.default_refresh(),
            mode.default_commit(),
            version,
        );
        let workspace = self.workspace()?;
        workspace.reconfigure(snapshot)?;
        *self.config.write() = Some(Arc::new(next));
        debug!(shard = %self.shard, version, "index manager reconfigured");
        Ok(())
    }

    /// Drains the workspace, releases the reader and closes the store.
    ///
    /// Idempotent; tolerant of partial starts (missing workspace or
    /// reader is not an error).
    pub fn destroy(&self) -> IndexResult<()> {
        let mut state = self.state.write();
        if *state == ManagerState::Destroyed {
            return Ok(());
        }
        let previous = *state;
        *state = ManagerState::Destroyed;
        drop(state);

        let mut result = Ok(());
        if let Some(workspace) = self.workspace.write().take() {
            if let Err(err) = workspace.close() {
                warn!(shard = %self.shard, error = %err, "workspace close failed during destroy");
                result = Err(err);
            }
        }
        if let Some(reader) = self.reader.write().take() {
            if let Err(err) = reader.close() {
                warn!(shard = %self.shard, error = %err, "reader close failed during destroy");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        if let Some(backend) = self.backend.write().take() {
            if let Err(err) = backend.close_shard(self.shard) {
                warn!(shard = %self.shard, error = %err, "store close failed during destroy");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        info!(shard = %self.shard, from = %previous, "index manager destroyed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::monitor::NullMonitor;
    use crate::types::TypeId;
    use crate::work::WorkItem;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct LifecycleBackend {
        events: Mutex<Vec<&'static str>>,
        fail_open: bool,
    }

    impl crate::backend::IndexBackend for LifecycleBackend {
        fn open_shard(&self, _: ShardId) -> IndexResult<()> {
            if self.fail_open {
                return Err(IndexError::backend_fatal("store unavailable"));
            }
            self.events.lock().push("open");
            Ok(())
        }
        fn close_shard(&self, _: ShardId) -> IndexResult<()> {
            self.events.lock().push("close");
            Ok(())
        }
        fn apply_add(&self, _: ShardId, _: &WorkItem) -> IndexResult<()> {
            Ok(())
        }
        fn apply_update(&self, _: ShardId, _: &WorkItem) -> IndexResult<()> {
            self.events.lock().push("update");
            Ok(())
        }
        fn apply_delete(&self, _: ShardId, _: &WorkItem) -> IndexResult<()> {
            Ok(())
        }
        fn purge_all(&self, _: ShardId, _: &TypeId) -> IndexResult<()> {
            Ok(())
        }
        fn commit(&self, _: ShardId) -> IndexResult<()> {
            Ok(())
        }
        fn refresh(&self, _: ShardId) -> IndexResult<()> {
            Ok(())
        }
        fn optimize(&self, _: ShardId) -> IndexResult<()> {
            Ok(())
        }
    }

    fn started_manager() -> (IndexManager, Arc<LifecycleBackend>) {
        let manager = IndexManager::new(ShardId::new(0));
        manager.initialize(IndexConfig::new("books")).unwrap();
        let backend = Arc::new(LifecycleBackend::default());
        manager
            .start(
                Arc::clone(&backend) as Arc<dyn IndexBackend>,
                Arc::new(NullMonitor),
            )
            .unwrap();
        (manager, backend)
    }

    #[test]
    fn lifecycle_happy_path() {
        let (manager, backend) = started_manager();
        assert_eq!(manager.state(), ManagerState::Started);
        manager.destroy().unwrap();
        assert_eq!(manager.state(), ManagerState::Destroyed);
        assert_eq!(backend.events.lock().as_slice(), ["open", "close"]);
    }

    #[test]
    fn start_before_initialize_is_invalid() {
        let manager = IndexManager::new(ShardId::new(0));
        let err = manager
            .start(
                Arc::new(LifecycleBackend::default()),
                Arc::new(NullMonitor),
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidState { .. }));
    }

    #[test]
    fn double_initialize_is_invalid() {
        let manager = IndexManager::new(ShardId::new(0));
        manager.initialize(IndexConfig::new("books")).unwrap();
        let err = manager.initialize(IndexConfig::new("books")).unwrap_err();
        assert!(matches!(err, IndexError::InvalidState { .. }));
    }

    #[test]
    fn failed_start_leaves_manager_destroyable() {
        let manager = IndexManager::new(ShardId::new(0));
        manager.initialize(IndexConfig::new("books")).unwrap();
        let backend = Arc::new(LifecycleBackend {
            fail_open: true,
            ..Default::default()
        });
        let err = manager
            .start(backend as Arc<dyn IndexBackend>, Arc::new(NullMonitor))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(manager.state(), ManagerState::Initialized);
        // Partial start: destroy must still succeed.
        manager.destroy().unwrap();
        assert_eq!(manager.state(), ManagerState::Destroyed);
    }

    #[test]
    fn destroy_is_idempotent_and_terminal() {
        let (manager, _) = started_manager();
        manager.destroy().unwrap();
        manager.destroy().unwrap();
        let err = manager.initialize(IndexConfig::new("books")).unwrap_err();
        assert!(matches!(err, IndexError::InvalidState { .. }));
    }

    #[test]
    fn reconfigure_swaps_workspace_snapshot() {
        let (manager, _) = started_manager();
        let before = manager.workspace().unwrap().config_version();
        manager
            .reconfigure(|config| {
                config.max_queue_length = 5000;
            })
            .unwrap();
        let after = manager.workspace().unwrap().config_version();
        assert!(after > before);
        manager.destroy().unwrap();
    }

    #[test]
    fn reconfigure_cannot_change_shard_count() {
        let (manager, _) = started_manager();
        let err = manager
            .reconfigure(|config| {
                config.sharding = crate::routing::ShardingStrategy::IdHash { shard_count: 8 };
            })
            .unwrap_err();
        assert!(matches!(err, IndexError::Configuration { .. }));
        manager.destroy().unwrap();
    }

    #[test]
    fn debug_output_names_shard_and_state() {
        let manager = IndexManager::new(ShardId::new(3));
        let text = format!("{manager:?}");
        assert!(text.contains("ShardId(3)"), "got: {text}");
        assert!(text.contains("Uninitialized"), "got: {text}");
    }

    #[test]
    fn near_real_time_mode_defaults() {
        let mode = NearRealTimeMode;
        assert_eq!(mode.default_refresh(), DocumentRefreshStrategy::Force);
        assert_eq!(mode.default_commit(), DocumentCommitStrategy::None);
        let committed = CommittedMode;
        assert_eq!(committed.default_commit(), DocumentCommitStrategy::Force);
    }
}
