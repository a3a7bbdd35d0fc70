//! Reindexing dependency graph.
//!
//! The graph captures which index fields depend on which entity
//! properties, transitively, with bounded depth. It is built once at
//! process startup from per-type declarations (see [`GraphBuilder`])
//! and is immutable for the process lifetime: resolution never mutates
//! it, so concurrent reads are lock-free by construction.
//!
//! # Invariants
//!
//! - The graph is immutable after `build()`
//! - For an embedded association with finite depth `d`, no field
//!   contributed through it is more than `d` association-hops from the
//!   root; `depth = 0` means "association reference only"
//! - Inverse edges are precomputed at construction; resolution never
//!   performs a full graph scan

mod builder;

pub use builder::{EmbeddedDef, GraphBuilder, TypeDef};

use crate::types::{PropertyPath, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Embedding depth of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// At most this many association hops contribute fields.
    Bounded(u32),
    /// No depth limit.
    Unbounded,
}

impl Depth {
    /// Creates a bounded depth.
    #[must_use]
    pub const fn bounded(depth: u32) -> Self {
        Self::Bounded(depth)
    }

    /// Returns the smaller of two depths, treating `Unbounded` as infinite.
    #[must_use]
    pub fn min(self, other: Depth) -> Depth {
        match (self, other) {
            (Depth::Unbounded, d) | (d, Depth::Unbounded) => d,
            (Depth::Bounded(a), Depth::Bounded(b)) => Depth::Bounded(a.min(b)),
        }
    }

    /// Returns true if at least one more hop fits within this window.
    #[must_use]
    pub fn allows_hop(self) -> bool {
        match self {
            Depth::Unbounded => true,
            Depth::Bounded(d) => d >= 1,
        }
    }

    /// Consumes one hop from the window.
    #[must_use]
    pub fn decrement(self) -> Depth {
        match self {
            Depth::Unbounded => Depth::Unbounded,
            Depth::Bounded(d) => Depth::Bounded(d.saturating_sub(1)),
        }
    }

    /// Returns true if this window reaches strictly further than `other`.
    #[must_use]
    pub fn exceeds(self, other: Depth) -> bool {
        match (self, other) {
            (Depth::Unbounded, Depth::Unbounded) => false,
            (Depth::Unbounded, Depth::Bounded(_)) => true,
            (Depth::Bounded(_), Depth::Unbounded) => false,
            (Depth::Bounded(a), Depth::Bounded(b)) => a > b,
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Bounded(d) => write!(f, "{d}"),
            Depth::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Whether a change to the contained side triggers a rebuild of the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexPolicy {
    /// Rebuild the owner and keep propagating to its containers.
    Always,
    /// Rebuild the owner but stop propagation past it.
    Shallow,
    /// Never propagate through this association.
    Never,
}

/// Cardinality of an embedded association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// Single associated entity.
    ToOne,
    /// Collection of associated entities.
    ToMany,
}

/// Kind-specific data of a property edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// A plain indexed field on the owning type.
    DirectField,
    /// An association whose target's fields are embedded into the
    /// owner's document.
    Embedded {
        /// Type on the far side of the association.
        target: TypeId,
        /// How many hops of the target may contribute fields.
        depth: Depth,
        /// Allow-list of embedded paths; `None` embeds everything.
        include_paths: Option<Vec<PropertyPath>>,
        /// Change-propagation policy for the association.
        reindex: ReindexPolicy,
        /// Association cardinality.
        multiplicity: Multiplicity,
    },
    /// A computed field whose value depends on other property paths,
    /// possibly across associations.
    Derived {
        /// Property paths whose change triggers recomputation.
        depends_on: Vec<PropertyPath>,
    },
    /// Backref declared on a contained type, pointing at the owner's
    /// embedding property. Used only during resolution, never during
    /// document building.
    ContainedBy {
        /// The owning (containing) type.
        owner: TypeId,
        /// The embedding property on the owner this backref inverts.
        inverse_of: PropertyPath,
    },
}

/// One property declaration on an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEdge {
    /// The property on the owning type.
    pub source_path: PropertyPath,
    /// Kind-specific edge data.
    pub kind: EdgeKind,
}

/// All declarations for one indexable or contained type.
#[derive(Debug, Clone)]
pub struct TypeNode {
    /// The type this node describes.
    pub type_id: TypeId,
    /// Whether the type is itself a root (its documents are the unit of
    /// rebuild) or contained-only.
    pub indexed: bool,
    edges: Vec<PropertyEdge>,
}

impl TypeNode {
    pub(crate) fn new(type_id: TypeId, indexed: bool, edges: Vec<PropertyEdge>) -> Self {
        Self {
            type_id,
            indexed,
            edges,
        }
    }

    /// Returns the type's property edges in declaration order.
    #[must_use]
    pub fn edges(&self) -> &[PropertyEdge] {
        &self.edges
    }
}

/// A precomputed inversion of an embedded association: the hop the
/// resolver takes from a changed contained entity back to its owners.
#[derive(Debug, Clone)]
pub struct InverseEdge {
    /// The owning type on the far side of the inverse hop.
    pub owner: TypeId,
    /// The contained type this edge points into.
    pub contained: TypeId,
    /// The embedding property on the owner (the forward edge).
    pub forward_path: PropertyPath,
    /// The backref property on the contained type, when declared.
    pub backref_path: Option<PropertyPath>,
    /// Depth window of the forward edge; consulted per inverse hop.
    pub depth: Depth,
    /// Change-propagation policy of the forward edge.
    pub reindex: ReindexPolicy,
    /// Contained-side property paths that trigger this hop; `None`
    /// means any property change triggers it.
    pub triggering_paths: Option<Vec<PropertyPath>>,
}

impl InverseEdge {
    /// Returns true if a change to the given properties makes this hop
    /// relevant. An empty changed set is conservative: anything may have
    /// changed.
    #[must_use]
    pub fn triggered_by(&self, changed: &[PropertyPath]) -> bool {
        if changed.is_empty() {
            return true;
        }
        match &self.triggering_paths {
            None => true,
            Some(paths) => paths
                .iter()
                .any(|p| changed.iter().any(|c| c.overlaps(p))),
        }
    }
}

/// The immutable reindexing dependency graph.
///
/// Built once by [`GraphBuilder`]; exposes forward edges in declaration
/// order (for deterministic resolution) and a precomputed inverse index.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: HashMap<TypeId, TypeNode>,
    inverse: HashMap<TypeId, Vec<InverseEdge>>,
}

impl DependencyGraph {
    pub(crate) fn from_parts(
        nodes: HashMap<TypeId, TypeNode>,
        inverse: HashMap<TypeId, Vec<InverseEdge>>,
    ) -> Self {
        Self { nodes, inverse }
    }

    /// Starts building a graph.
    #[must_use]
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Returns the property edges declared on a type, in declaration order.
    #[must_use]
    pub fn edges_from(&self, type_id: &TypeId) -> &[PropertyEdge] {
        self.nodes.get(type_id).map(TypeNode::edges).unwrap_or(&[])
    }

    /// Returns the precomputed inverse edges into a type.
    #[must_use]
    pub fn inverse_edges_into(&self, type_id: &TypeId) -> &[InverseEdge] {
        self.inverse
            .get(type_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if the type is a root whose documents are rebuilt.
    #[must_use]
    pub fn is_indexed(&self, type_id: &TypeId) -> bool {
        self.nodes.get(type_id).map(|n| n.indexed).unwrap_or(false)
    }

    /// Returns true if the type is declared in the graph.
    #[must_use]
    pub fn contains_type(&self, type_id: &TypeId) -> bool {
        self.nodes.contains_key(type_id)
    }

    /// Returns the number of declared types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.nodes.len()
    }
}
