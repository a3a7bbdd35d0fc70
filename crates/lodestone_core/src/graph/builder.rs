//! Builder API for the dependency graph.
//!
//! Type declarations are supplied explicitly through [`TypeDef`] and
//! [`EmbeddedDef`]; the builder validates the declarations and
//! precomputes the inverse-edge index at `build()` time. A graph that
//! fails validation never exists: the process must not start with an
//! invalid dependency graph.

use crate::error::{IndexError, IndexResult};
use crate::graph::{
    DependencyGraph, Depth, EdgeKind, InverseEdge, Multiplicity, PropertyEdge, ReindexPolicy,
    TypeNode,
};
use crate::types::{PropertyPath, TypeId};
use std::collections::{HashMap, HashSet};

/// Declaration of one embedded association.
#[derive(Debug, Clone)]
pub struct EmbeddedDef {
    source_path: PropertyPath,
    target: TypeId,
    depth: Depth,
    include_paths: Option<Vec<PropertyPath>>,
    reindex: ReindexPolicy,
    multiplicity: Multiplicity,
}

impl EmbeddedDef {
    /// Declares an embedded association from `source_path` to `target`.
    ///
    /// Defaults: unbounded depth, no include allow-list, reindex on
    /// every update, to-one cardinality.
    pub fn new(source_path: impl Into<PropertyPath>, target: impl Into<TypeId>) -> Self {
        Self {
            source_path: source_path.into(),
            target: target.into(),
            depth: Depth::Unbounded,
            include_paths: None,
            reindex: ReindexPolicy::Always,
            multiplicity: Multiplicity::ToOne,
        }
    }

    /// Bounds the embedding depth.
    #[must_use]
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = Depth::Bounded(depth);
        self
    }

    /// Restricts embedded fields to an allow-list of paths.
    #[must_use]
    pub fn include_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyPath>,
    {
        self.include_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Rebuilds the immediate owner but stops propagation past it.
    #[must_use]
    pub fn shallow(mut self) -> Self {
        self.reindex = ReindexPolicy::Shallow;
        self
    }

    /// Never propagates contained-side changes through this association.
    #[must_use]
    pub fn no_reindex(mut self) -> Self {
        self.reindex = ReindexPolicy::Never;
        self
    }

    /// Marks the association as a collection.
    #[must_use]
    pub fn to_many(mut self) -> Self {
        self.multiplicity = Multiplicity::ToMany;
        self
    }
}

/// Declaration of one entity type and its property edges.
#[derive(Debug, Clone)]
pub struct TypeDef {
    type_id: TypeId,
    indexed: bool,
    edges: Vec<PropertyEdge>,
}

impl TypeDef {
    /// Declares a root type whose documents are the unit of rebuild.
    pub fn indexed(type_id: impl Into<TypeId>) -> Self {
        Self {
            type_id: type_id.into(),
            indexed: true,
            edges: Vec::new(),
        }
    }

    /// Declares a contained-only type: its changes can trigger rebuilds
    /// of containing documents, but it is not separately indexed.
    pub fn contained(type_id: impl Into<TypeId>) -> Self {
        Self {
            type_id: type_id.into(),
            indexed: false,
            edges: Vec::new(),
        }
    }

    /// Declares a plain indexed field.
    #[must_use]
    pub fn direct_field(mut self, path: impl Into<PropertyPath>) -> Self {
        self.edges.push(PropertyEdge {
            source_path: path.into(),
            kind: EdgeKind::DirectField,
        });
        self
    }

    /// Declares a derived field recomputed when any `depends_on` path changes.
    #[must_use]
    pub fn derived<I, P>(mut self, path: impl Into<PropertyPath>, depends_on: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyPath>,
    {
        self.edges.push(PropertyEdge {
            source_path: path.into(),
            kind: EdgeKind::Derived {
                depends_on: depends_on.into_iter().map(Into::into).collect(),
            },
        });
        self
    }

    /// Declares an embedded association.
    #[must_use]
    pub fn embedded(mut self, def: EmbeddedDef) -> Self {
        self.edges.push(PropertyEdge {
            source_path: def.source_path,
            kind: EdgeKind::Embedded {
                target: def.target,
                depth: def.depth,
                include_paths: def.include_paths,
                reindex: def.reindex,
                multiplicity: def.multiplicity,
            },
        });
        self
    }

    /// Declares the backref inverting an owner's embedding property.
    #[must_use]
    pub fn contained_by(
        mut self,
        backref_path: impl Into<PropertyPath>,
        owner: impl Into<TypeId>,
        inverse_of: impl Into<PropertyPath>,
    ) -> Self {
        self.edges.push(PropertyEdge {
            source_path: backref_path.into(),
            kind: EdgeKind::ContainedBy {
                owner: owner.into(),
                inverse_of: inverse_of.into(),
            },
        });
        self
    }
}

/// Builds and validates a [`DependencyGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    types: Vec<TypeDef>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one type declaration.
    #[must_use]
    pub fn type_def(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }

    /// Validates the declarations and builds the immutable graph.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] naming the offending type
    /// and property when:
    /// - a type or property is declared twice;
    /// - an embedded association targets an undeclared type;
    /// - an embedded association with finite depth has no matching
    ///   backref declared on its target;
    /// - a backref does not invert an existing embedding;
    /// - a derived field depends on a property path that does not exist.
    pub fn build(self) -> IndexResult<DependencyGraph> {
        let mut nodes: HashMap<TypeId, TypeNode> = HashMap::new();
        for def in self.types {
            if nodes.contains_key(&def.type_id) {
                return Err(IndexError::configuration(format!(
                    "type {} declared twice",
                    def.type_id
                )));
            }
            let mut seen = HashSet::new();
            for edge in &def.edges {
                if !seen.insert(edge.source_path.clone()) {
                    return Err(IndexError::configuration(format!(
                        "property {}.{} declared twice",
                        def.type_id, edge.source_path
                    )));
                }
            }
            nodes.insert(
                def.type_id.clone(),
                TypeNode::new(def.type_id, def.indexed, def.edges),
            );
        }

        validate(&nodes)?;
        let inverse = invert(&nodes);
        Ok(DependencyGraph::from_parts(nodes, inverse))
    }
}

fn validate(nodes: &HashMap<TypeId, TypeNode>) -> IndexResult<()> {
    for node in nodes.values() {
        for edge in node.edges() {
            match &edge.kind {
                EdgeKind::Embedded { target, depth, .. } => {
                    let Some(target_node) = nodes.get(target) else {
                        return Err(IndexError::configuration(format!(
                            "embedded association {}.{} targets undeclared type {}",
                            node.type_id, edge.source_path, target
                        )));
                    };
                    if matches!(depth, Depth::Bounded(_))
                        && find_backref(target_node, &node.type_id, &edge.source_path).is_none()
                    {
                        return Err(IndexError::configuration(format!(
                            "embedded association {}.{} has finite depth but {} declares \
                             no matching backref; changes could not propagate back",
                            node.type_id, edge.source_path, target
                        )));
                    }
                }
                EdgeKind::ContainedBy { owner, inverse_of } => {
                    let Some(owner_node) = nodes.get(owner) else {
                        return Err(IndexError::configuration(format!(
                            "backref {}.{} names undeclared owner type {}",
                            node.type_id, edge.source_path, owner
                        )));
                    };
                    let inverts_embedding = owner_node.edges().iter().any(|e| {
                        e.source_path == *inverse_of
                            && matches!(&e.kind, EdgeKind::Embedded { target, .. } if *target == node.type_id)
                    });
                    if !inverts_embedding {
                        return Err(IndexError::configuration(format!(
                            "backref {}.{} does not invert an embedding {}.{}",
                            node.type_id, edge.source_path, owner, inverse_of
                        )));
                    }
                }
                EdgeKind::Derived { depends_on } => {
                    for path in depends_on {
                        if !path_resolves(nodes, &node.type_id, path) {
                            return Err(IndexError::configuration(format!(
                                "derived field {}.{} depends on non-existent path {}",
                                node.type_id, edge.source_path, path
                            )));
                        }
                    }
                }
                EdgeKind::DirectField => {}
            }
        }
    }
    Ok(())
}

/// Checks that a (possibly association-crossing) property path resolves
/// against the declared edges, one segment at a time.
fn path_resolves(nodes: &HashMap<TypeId, TypeNode>, type_id: &TypeId, path: &PropertyPath) -> bool {
    let Some(node) = nodes.get(type_id) else {
        return false;
    };
    let head = PropertyPath::new(path.head());
    let Some(edge) = node.edges().iter().find(|e| e.source_path == head) else {
        return false;
    };
    match path.tail() {
        None => true,
        Some(rest) => match &edge.kind {
            EdgeKind::Embedded { target, .. } => path_resolves(nodes, target, &rest),
            _ => false,
        },
    }
}

fn find_backref<'a>(
    contained: &'a TypeNode,
    owner: &TypeId,
    inverse_of: &PropertyPath,
) -> Option<&'a PropertyPath> {
    contained.edges().iter().find_map(|e| match &e.kind {
        EdgeKind::ContainedBy {
            owner: o,
            inverse_of: p,
        } if o == owner && p == inverse_of => Some(&e.source_path),
        _ => None,
    })
}

/// Inverts every embedded association into the per-target inverse index.
fn invert(nodes: &HashMap<TypeId, TypeNode>) -> HashMap<TypeId, Vec<InverseEdge>> {
    let mut inverse: HashMap<TypeId, Vec<InverseEdge>> = HashMap::new();
    for node in nodes.values() {
        for edge in node.edges() {
            let EdgeKind::Embedded {
                target,
                depth,
                include_paths,
                reindex,
                ..
            } = &edge.kind
            else {
                continue;
            };
            let backref = nodes
                .get(target)
                .and_then(|t| find_backref(t, &node.type_id, &edge.source_path))
                .cloned();
            let triggering = triggering_paths(node, &edge.source_path, include_paths.as_deref());
            inverse.entry(target.clone()).or_default().push(InverseEdge {
                owner: node.type_id.clone(),
                contained: target.clone(),
                forward_path: edge.source_path.clone(),
                backref_path: backref,
                depth: *depth,
                reindex: *reindex,
                triggering_paths: triggering,
            });
        }
    }
    // Deterministic inverse order regardless of HashMap iteration.
    for edges in inverse.values_mut() {
        edges.sort_by(|a, b| {
            (&a.owner, &a.forward_path).cmp(&(&b.owner, &b.forward_path))
        });
    }
    inverse
}

/// Computes the contained-side paths that make an inverse hop relevant:
/// the embedding's include allow-list plus the tails of any owner-side
/// derived dependencies crossing this association. `None` means every
/// change triggers the hop.
fn triggering_paths(
    owner: &TypeNode,
    forward_path: &PropertyPath,
    include_paths: Option<&[PropertyPath]>,
) -> Option<Vec<PropertyPath>> {
    let include = include_paths?;
    let mut paths: Vec<PropertyPath> = include.to_vec();
    for edge in owner.edges() {
        if let EdgeKind::Derived { depends_on } = &edge.kind {
            for dep in depends_on {
                if dep.head() == forward_path.as_str() {
                    if let Some(tail) = dep.tail() {
                        if !paths.contains(&tail) {
                            paths.push(tail);
                        }
                    }
                }
            }
        }
    }
    Some(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_parents(depth: u32) -> DependencyGraph {
        DependencyGraph::builder()
            .type_def(
                TypeDef::indexed("Person")
                    .direct_field("name")
                    .embedded(EmbeddedDef::new("parents", "Person").depth(depth).to_many())
                    .contained_by("children", "Person", "parents"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn builds_inverse_index() {
        let graph = person_parents(2);
        let person = TypeId::new("Person");
        let inverse = graph.inverse_edges_into(&person);
        assert_eq!(inverse.len(), 1);
        assert_eq!(inverse[0].owner, person);
        assert_eq!(inverse[0].depth, Depth::Bounded(2));
        assert_eq!(
            inverse[0].backref_path.as_ref().unwrap().as_str(),
            "children"
        );
    }

    #[test]
    fn edges_preserve_declaration_order() {
        let graph = person_parents(2);
        let person = TypeId::new("Person");
        let paths: Vec<_> = graph
            .edges_from(&person)
            .iter()
            .map(|e| e.source_path.as_str())
            .collect();
        assert_eq!(paths, vec!["name", "parents", "children"]);
    }

    #[test]
    fn finite_depth_without_backref_is_rejected() {
        let err = DependencyGraph::builder()
            .type_def(
                TypeDef::indexed("Order")
                    .embedded(EmbeddedDef::new("customer", "Customer").depth(1)),
            )
            .type_def(TypeDef::contained("Customer").direct_field("name"))
            .build()
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Order.customer"), "got: {text}");
        assert!(matches!(err, IndexError::Configuration { .. }));
    }

    #[test]
    fn unbounded_depth_needs_no_backref() {
        let graph = DependencyGraph::builder()
            .type_def(TypeDef::indexed("Order").embedded(EmbeddedDef::new("customer", "Customer")))
            .type_def(TypeDef::contained("Customer").direct_field("name"))
            .build()
            .unwrap();
        let inverse = graph.inverse_edges_into(&TypeId::new("Customer"));
        assert_eq!(inverse.len(), 1);
        assert!(inverse[0].backref_path.is_none());
    }

    #[test]
    fn derived_unknown_path_is_rejected() {
        let err = DependencyGraph::builder()
            .type_def(
                TypeDef::indexed("Person")
                    .direct_field("first")
                    .derived("sort_name", ["first", "last"]),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("last"));
    }

    #[test]
    fn derived_path_across_association_resolves() {
        let graph = DependencyGraph::builder()
            .type_def(
                TypeDef::indexed("Order")
                    .embedded(
                        EmbeddedDef::new("customer", "Customer")
                            .depth(1)
                            .include_paths(["name"]),
                    )
                    .derived("label", ["customer.name"]),
            )
            .type_def(
                TypeDef::contained("Customer")
                    .direct_field("name")
                    .direct_field("email")
                    .contained_by("orders", "Order", "customer"),
            )
            .build()
            .unwrap();
        let inverse = graph.inverse_edges_into(&TypeId::new("Customer"));
        let triggering = inverse[0].triggering_paths.as_ref().unwrap();
        assert!(triggering.contains(&PropertyPath::new("name")));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let err = DependencyGraph::builder()
            .type_def(TypeDef::indexed("Person"))
            .type_def(TypeDef::indexed("Person"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Person"));
    }

    #[test]
    fn duplicate_property_is_rejected() {
        let err = DependencyGraph::builder()
            .type_def(TypeDef::indexed("Person").direct_field("name").direct_field("name"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Person.name"));
    }

    #[test]
    fn backref_must_invert_an_embedding() {
        let err = DependencyGraph::builder()
            .type_def(TypeDef::indexed("Order").direct_field("total"))
            .type_def(
                TypeDef::contained("Customer").contained_by("orders", "Order", "customer"),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Customer.orders"));
    }
}
