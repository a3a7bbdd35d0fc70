//! Index coordinator.
//!
//! The coordinator is the entry point tying the pipeline together: a
//! change event is resolved against the dependency graph, the resolved
//! roots become work items, the router assigns each item its shard, and
//! the items land in the per-shard workspaces. Shards are always
//! visited in ascending id order, which keeps multi-shard operations
//! deadlock free.

use crate::backend::IndexBackend;
use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::graph::DependencyGraph;
use crate::manager::IndexManager;
use crate::monitor::{FailureEntry, FailureMonitor, FailureReport};
use crate::resolver::{AssociationAccess, ChangedEntity, Resolver};
use crate::routing::{Router, ShardAssignment};
use crate::types::{EntityRef, PropertyPath, RoutingKey, ShardId, TenantId, TypeId};
use crate::work::{DocumentBuilder, Operation, WorkBuilder, WorkItem};
use crate::workspace::BatchOutcome;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One change notification handed to the coordinator.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The entity that changed.
    pub entity: EntityRef,
    /// The properties that changed; empty means unknown.
    pub changed_properties: Vec<PropertyPath>,
    /// The operation applied to the changed entity itself.
    pub operation: Operation,
    /// Tenant discriminator, when multi-tenancy is active.
    pub tenant: Option<TenantId>,
    /// Routing key passed through from the persistence layer.
    pub routing_key: Option<RoutingKey>,
}

impl ChangeEvent {
    /// Creates a change event with a known changed-property set.
    pub fn new<I, P>(entity: EntityRef, operation: Operation, changed_properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyPath>,
    {
        Self {
            entity,
            changed_properties: changed_properties.into_iter().map(Into::into).collect(),
            operation,
            tenant: None,
            routing_key: None,
        }
    }

    /// Creates a change event with an unknown changed-property set.
    #[must_use]
    pub fn any(entity: EntityRef, operation: Operation) -> Self {
        Self {
            entity,
            changed_properties: Vec::new(),
            operation,
            tenant: None,
            routing_key: None,
        }
    }

    /// Attaches a tenant discriminator.
    #[must_use]
    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Attaches a routing key.
    #[must_use]
    pub fn with_routing_key(mut self, key: RoutingKey) -> Self {
        self.routing_key = Some(key);
        self
    }
}

/// Outcome of resolving and enqueuing one change event.
#[derive(Debug, Default)]
pub struct EnqueueReport {
    /// Root entities the resolver produced for the change.
    pub roots_resolved: usize,
    /// Work items handed to shard workspaces.
    pub items_enqueued: usize,
    /// Per-item failures encountered while building documents.
    pub failures: FailureReport,
}

/// Drives the full change pipeline over one logical index.
pub struct IndexCoordinator {
    graph: Arc<DependencyGraph>,
    router: Router,
    assignment: ShardAssignment,
    managers: BTreeMap<ShardId, Arc<IndexManager>>,
    work: WorkBuilder,
    associations: Arc<dyn AssociationAccess>,
    monitor: Arc<dyn FailureMonitor>,
}

impl IndexCoordinator {
    /// Builds and starts the coordinator: one manager per shard,
    /// initialized and started against the backend.
    ///
    /// Partial start is rolled back: if any shard fails to start, every
    /// already-started shard is destroyed before the error propagates.
    pub fn start(
        config: IndexConfig,
        graph: Arc<DependencyGraph>,
        backend: Arc<dyn IndexBackend>,
        documents: Arc<dyn DocumentBuilder>,
        associations: Arc<dyn AssociationAccess>,
        monitor: Arc<dyn FailureMonitor>,
    ) -> IndexResult<Self> {
        let router = Router::new(config.sharding.clone())?;
        let assignment = ShardAssignment::new(config.index_name.clone(), router.shard_count());

        let mut managers: BTreeMap<ShardId, Arc<IndexManager>> = BTreeMap::new();
        for shard in assignment.shards() {
            let manager = Arc::new(IndexManager::new(*shard));
            manager.initialize(config.clone())?;
            if let Err(err) = manager.start(Arc::clone(&backend), Arc::clone(&monitor)) {
                for started in managers.values() {
                    let _ = started.destroy();
                }
                return Err(err);
            }
            managers.insert(*shard, manager);
        }
        info!(
            index = assignment.index_name(),
            shards = assignment.shard_count(),
            "index coordinator started"
        );
        Ok(Self {
            graph,
            router,
            assignment,
            managers,
            work: WorkBuilder::new(documents),
            associations,
            monitor,
        })
    }

    /// Returns the shard assignment for this index.
    #[must_use]
    pub fn assignment(&self) -> &ShardAssignment {
        &self.assignment
    }

    /// Returns the manager for one shard.
    pub fn manager(&self, shard: ShardId) -> IndexResult<&Arc<IndexManager>> {
        self.managers.get(&shard).ok_or_else(|| {
            IndexError::routing(format!(
                "shard {shard} is outside the index's assignment"
            ))
        })
    }

    /// Resolves a change event and enqueues the resulting work.
    ///
    /// The changed entity receives the event's operation; every other
    /// resolved root is rebuilt with an update. Purge bypasses
    /// resolution entirely; purge-all and optimize broadcast to every
    /// shard. Document-building failures are recoverable per root: they
    /// are reported to the monitor and collected in the returned report
    /// while the remaining roots proceed.
    pub fn resolve_and_enqueue(&self, event: &ChangeEvent) -> IndexResult<EnqueueReport> {
        let mut report = EnqueueReport::default();
        let mut grouped: BTreeMap<ShardId, Vec<WorkItem>> = BTreeMap::new();

        match event.operation {
            Operation::Purge => {
                report.roots_resolved = 1;
                self.build_into(&event.entity, Operation::Purge, event, &mut grouped, &mut report)?;
            }
            Operation::PurgeAll => {
                self.build_into(
                    &event.entity,
                    Operation::PurgeAll,
                    event,
                    &mut grouped,
                    &mut report,
                )?;
            }
            Operation::Optimize => {
                self.build_into(
                    &event.entity,
                    Operation::Optimize,
                    event,
                    &mut grouped,
                    &mut report,
                )?;
            }
            Operation::Add | Operation::Update | Operation::Delete => {
                let change = ChangedEntity {
                    entity: event.entity.clone(),
                    changed_properties: event.changed_properties.clone(),
                };
                let roots = Resolver::new(&self.graph).resolve(&change, &*self.associations)?;
                report.roots_resolved = roots.len();

                // Deterministic processing order for equal inputs.
                let mut roots: Vec<EntityRef> = roots.into_iter().collect();
                roots.sort();
                for root in &roots {
                    let operation = if *root == event.entity {
                        event.operation
                    } else {
                        Operation::Update
                    };
                    self.build_into(root, operation, event, &mut grouped, &mut report)?;
                }
            }
        }

        for (shard, items) in grouped {
            let workspace = self.manager(shard)?.workspace()?;
            for item in items {
                workspace.enqueue(item)?;
                report.items_enqueued += 1;
            }
        }
        debug!(
            entity = %event.entity,
            roots = report.roots_resolved,
            enqueued = report.items_enqueued,
            "change resolved and enqueued"
        );
        Ok(report)
    }

    fn build_into(
        &self,
        root: &EntityRef,
        operation: Operation,
        event: &ChangeEvent,
        grouped: &mut BTreeMap<ShardId, Vec<WorkItem>>,
        report: &mut EnqueueReport,
    ) -> IndexResult<()> {
        let items = match self.work.build(
            root,
            operation,
            event.tenant.as_ref(),
            event.routing_key.as_ref(),
        ) {
            Ok(items) => items,
            Err(err) if !err.is_fatal() => {
                let entry =
                    FailureEntry::from_error(Some(root.type_id.clone()), Some(root.entity_id), &err);
                self.monitor.on_failure(entry.clone());
                report.failures.add(entry);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        for item in items {
            for shard in self.router.route(&item)? {
                grouped.entry(shard).or_default().push(item.clone());
            }
        }
        Ok(())
    }

    /// Drains every shard's queue, ascending, applying the pending work.
    pub fn flush(&self) -> IndexResult<BTreeMap<ShardId, BatchOutcome>> {
        let mut outcomes = BTreeMap::new();
        for (shard, manager) in &self.managers {
            outcomes.insert(*shard, manager.workspace()?.drain()?);
        }
        Ok(outcomes)
    }

    /// Removes every document of one entity type, on every shard.
    pub fn purge_all(&self, type_id: &TypeId) -> IndexResult<EnqueueReport> {
        let event = ChangeEvent::any(
            EntityRef::new(type_id.clone(), crate::types::EntityId::new(0)),
            Operation::PurgeAll,
        );
        self.resolve_and_enqueue(&event)
    }

    /// Requests compaction of every shard, ascending.
    pub fn optimize_all(&self) -> IndexResult<()> {
        for manager in self.managers.values() {
            manager.workspace()?.request_optimize()?;
        }
        Ok(())
    }

    /// Applies a configuration change to every shard manager.
    pub fn reconfigure(&self, mutate: impl Fn(&mut IndexConfig)) -> IndexResult<()> {
        for manager in self.managers.values() {
            manager.reconfigure(&mutate)?;
        }
        Ok(())
    }

    /// Flushes and destroys every shard manager, ascending. Idempotent.
    pub fn shutdown(&self) -> IndexResult<()> {
        let mut result = Ok(());
        for manager in self.managers.values() {
            if let Err(err) = manager.destroy() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}
