//! Reindexing resolver.
//!
//! Given a changed entity and the set of changed properties, the
//! resolver walks the dependency graph's inverse edges breadth-first
//! and returns the exact, deduplicated set of root entities whose index
//! documents must be rebuilt.
//!
//! Depth bookkeeping: each traversal branch carries a remaining-depth
//! budget. The budget starts unbounded at the changed entity; crossing
//! an inverse edge is allowed iff `min(budget, edge.depth) >= 1`, and
//! the branch continues with `min(budget, edge.depth) - 1`. A root is
//! included if *any* path reaches it within budget; when a later path
//! reaches an already-visited entity with a strictly larger remaining
//! budget, traversal resumes from it so deeper dependents are not lost.
//!
//! Termination is guaranteed even over cyclic graphs (including
//! self-referential embeddings): the per-call memo never revisits an
//! entity unless the remaining budget strictly improved, and budgets
//! only shrink along a branch.

use crate::error::IndexResult;
use crate::graph::{DependencyGraph, Depth, InverseEdge, ReindexPolicy};
use crate::types::{EntityRef, PropertyPath};
use std::collections::{HashMap, HashSet, VecDeque};

/// A change notification for one entity, as emitted by the persistence
/// layer.
#[derive(Debug, Clone)]
pub struct ChangedEntity {
    /// The entity that changed.
    pub entity: EntityRef,
    /// The properties that changed. Empty means unknown: every branch
    /// is explored conservatively.
    pub changed_properties: Vec<PropertyPath>,
}

impl ChangedEntity {
    /// Creates a change with a known changed-property set.
    pub fn new<I, P>(entity: EntityRef, changed_properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyPath>,
    {
        Self {
            entity,
            changed_properties: changed_properties.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a change with an unknown changed-property set.
    #[must_use]
    pub fn any(entity: EntityRef) -> Self {
        Self {
            entity,
            changed_properties: Vec::new(),
        }
    }
}

/// Persistence-layer collaborator that materializes inverse associations.
///
/// Given a contained entity and an inverted embedding, returns the ids
/// of the owner entities containing it. Implementations typically read
/// the backref property ([`InverseEdge::backref_path`]) of the loaded
/// entity instance.
pub trait AssociationAccess: Send + Sync {
    /// Returns the owner ids containing `contained` through `via`.
    fn owners_of(
        &self,
        contained: &EntityRef,
        via: &InverseEdge,
    ) -> IndexResult<Vec<crate::types::EntityId>>;
}

/// Read-only traversal over the dependency graph.
///
/// `resolve` is a pure function of `(graph, changed entity, changed
/// properties)`: the graph is never mutated and concurrent calls never
/// contend.
pub struct Resolver<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> Resolver<'g> {
    /// Creates a resolver over an immutable graph.
    #[must_use]
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    /// Computes the set of root entities requiring rebuild for a change.
    ///
    /// The changed entity itself is part of the result iff its type is
    /// indexed. The result is deduplicated: the same root never appears
    /// twice for one call.
    pub fn resolve(
        &self,
        change: &ChangedEntity,
        associations: &dyn AssociationAccess,
    ) -> IndexResult<HashSet<EntityRef>> {
        let mut roots: HashSet<EntityRef> = HashSet::new();
        // Best remaining budget seen per entity; doubles as the memo set.
        let mut best: HashMap<EntityRef, Depth> = HashMap::new();
        let mut queue: VecDeque<(EntityRef, Depth)> = VecDeque::new();

        if self.graph.is_indexed(&change.entity.type_id) {
            roots.insert(change.entity.clone());
        }
        best.insert(change.entity.clone(), Depth::Unbounded);
        queue.push_back((change.entity.clone(), Depth::Unbounded));

        let mut first_hop = true;
        while let Some((current, budget)) = queue.pop_front() {
            for edge in self.graph.inverse_edges_into(&current.type_id) {
                if edge.reindex == ReindexPolicy::Never {
                    continue;
                }
                // Changed-property pruning applies only to hops leaving
                // the changed entity; deeper hops are explored
                // conservatively.
                if first_hop && !edge.triggered_by(&change.changed_properties) {
                    continue;
                }
                let window = budget.min(edge.depth);
                if !window.allows_hop() {
                    continue;
                }
                let remaining = window.decrement();

                for owner_id in associations.owners_of(&current, edge)? {
                    let owner = EntityRef::new(edge.owner.clone(), owner_id);
                    let improved = best
                        .get(&owner)
                        .map_or(true, |prev| remaining.exceeds(*prev));
                    if !improved {
                        continue;
                    }
                    if self.graph.is_indexed(&edge.owner) {
                        roots.insert(owner.clone());
                    }
                    best.insert(owner.clone(), remaining);
                    if edge.reindex != ReindexPolicy::Shallow {
                        queue.push_back((owner, remaining));
                    }
                }
            }
            first_hop = false;
        }

        Ok(roots)
    }
}
