//! Shared test fixtures.
//!
//! The calibration scenario used across the crate is a genealogy: a
//! `Person` type that embeds its own parents up to a configurable
//! depth. Seventeen people are numbered 1..=17 and the parents of
//! person `n` are `2n` and `2n + 1` (where those exist), so person 1
//! is the youngest descendant and 16/17 are the oldest ancestors.

use lodestone_core::error::IndexResult;
use lodestone_core::graph::{DependencyGraph, EmbeddedDef, InverseEdge, TypeDef};
use lodestone_core::resolver::AssociationAccess;
use lodestone_core::types::{EntityId, EntityRef};
use lodestone_core::work::{Document, DocumentBuilder};

/// Number of people in the genealogy fixture.
pub const GENEALOGY_SIZE: u64 = 17;

/// Builds the genealogy dependency graph with the given embedding depth.
///
/// `Person` is indexed, embeds `parents` (to-many, bounded by `depth`)
/// and declares the matching `children` backref.
pub fn genealogy_graph(depth: u32) -> DependencyGraph {
    DependencyGraph::builder()
        .type_def(
            TypeDef::indexed("Person")
                .direct_field("name")
                .direct_field("birth_year")
                .embedded(EmbeddedDef::new("parents", "Person").depth(depth).to_many())
                .contained_by("children", "Person", "parents"),
        )
        .build()
        .expect("genealogy graph is valid")
}

/// In-memory association and document store over the genealogy.
///
/// Implements both persistence-layer collaborators: inverse
/// association lookup for the resolver and document building for the
/// work builder.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenealogyStore;

impl GenealogyStore {
    /// Creates the fixture store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the child of one person, if any.
    ///
    /// Each person `n >= 2` is a parent of exactly `n / 2`.
    #[must_use]
    pub fn child_of(id: u64) -> Option<u64> {
        (2..=GENEALOGY_SIZE).contains(&id).then_some(id / 2)
    }
}

impl AssociationAccess for GenealogyStore {
    fn owners_of(&self, contained: &EntityRef, _via: &InverseEdge) -> IndexResult<Vec<EntityId>> {
        Ok(Self::child_of(contained.entity_id.as_u64())
            .map(EntityId::new)
            .into_iter()
            .collect())
    }
}

impl DocumentBuilder for GenealogyStore {
    fn build_document(&self, root: &EntityRef) -> IndexResult<Document> {
        let payload = format!("person:{}", root.entity_id.as_u64()).into_bytes();
        Ok(Document::new(root.type_id.clone(), root.entity_id, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genealogy_relationships() {
        assert_eq!(GenealogyStore::child_of(16), Some(8));
        assert_eq!(GenealogyStore::child_of(17), Some(8));
        assert_eq!(GenealogyStore::child_of(2), Some(1));
        assert_eq!(GenealogyStore::child_of(1), None);
        assert_eq!(GenealogyStore::child_of(18), None);
    }

    #[test]
    fn graph_builds_for_any_depth() {
        for depth in 1..=4 {
            let graph = genealogy_graph(depth);
            assert!(graph.is_indexed(&lodestone_core::types::TypeId::new("Person")));
        }
    }
}
