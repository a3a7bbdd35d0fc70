//! Work items and the work builder.
//!
//! A resolved root entity becomes one or more [`WorkItem`]s: the unit of
//! change applied to a shard's underlying writer. Work items are
//! ephemeral; they are created per change batch and consumed exactly
//! once by a shard workspace.

use crate::error::{IndexError, IndexResult};
use crate::types::{EntityId, EntityRef, RoutingKey, TenantId, TypeId};
use std::sync::Arc;

/// Kind of index modification carried by a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Add a freshly built document.
    Add,
    /// Replace an existing document with a freshly built one.
    Update,
    /// Remove the document for one entity.
    Delete,
    /// Remove the document for one entity, bypassing resolution.
    Purge,
    /// Remove every document of one entity type.
    PurgeAll,
    /// Trigger index compaction on the target shard.
    Optimize,
}

impl Operation {
    /// Returns true if the operation targets every shard of the index.
    #[must_use]
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::PurgeAll | Self::Optimize)
    }

    /// Returns true if the operation carries a freshly built document.
    #[must_use]
    pub fn requires_document(self) -> bool {
        matches!(self, Self::Add | Self::Update)
    }
}

/// An index document built by the external document-building collaborator.
///
/// The payload is opaque to the core; the underlying index engine owns
/// its interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Type of the root entity this document represents.
    pub type_id: TypeId,
    /// Identifier of the root entity.
    pub entity_id: EntityId,
    /// Opaque document payload.
    pub payload: Vec<u8>,
}

impl Document {
    /// Creates a document.
    pub fn new(type_id: impl Into<TypeId>, entity_id: EntityId, payload: Vec<u8>) -> Self {
        Self {
            type_id: type_id.into(),
            entity_id,
            payload,
        }
    }
}

/// One unit of index work, bound for a single shard.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// The operation to apply.
    pub operation: Operation,
    /// Entity type, absent only for index-wide [`Operation::Optimize`].
    pub type_id: Option<TypeId>,
    /// Entity identifier, absent for broadcast operations.
    pub entity_id: Option<EntityId>,
    /// Tenant discriminator, when multi-tenancy is active.
    pub tenant: Option<TenantId>,
    /// Routing key, passed through from the persistence layer.
    pub routing_key: Option<RoutingKey>,
    /// Freshly built document for add/update operations.
    pub document: Option<Document>,
}

impl WorkItem {
    /// Creates an add item carrying a built document.
    #[must_use]
    pub fn add(document: Document) -> Self {
        Self {
            operation: Operation::Add,
            type_id: Some(document.type_id.clone()),
            entity_id: Some(document.entity_id),
            tenant: None,
            routing_key: None,
            document: Some(document),
        }
    }

    /// Creates an update item carrying a built document.
    #[must_use]
    pub fn update(document: Document) -> Self {
        Self {
            operation: Operation::Update,
            ..Self::add(document)
        }
    }

    /// Creates a deletion marker keyed by entity id.
    pub fn delete(type_id: impl Into<TypeId>, entity_id: EntityId) -> Self {
        Self {
            operation: Operation::Delete,
            type_id: Some(type_id.into()),
            entity_id: Some(entity_id),
            tenant: None,
            routing_key: None,
            document: None,
        }
    }

    /// Creates a purge marker keyed by entity id.
    pub fn purge(type_id: impl Into<TypeId>, entity_id: EntityId) -> Self {
        Self {
            operation: Operation::Purge,
            ..Self::delete(type_id, entity_id)
        }
    }

    /// Creates a purge-all item for one entity type.
    pub fn purge_all(type_id: impl Into<TypeId>) -> Self {
        Self {
            operation: Operation::PurgeAll,
            type_id: Some(type_id.into()),
            entity_id: None,
            tenant: None,
            routing_key: None,
            document: None,
        }
    }

    /// Creates an index-wide optimize request.
    #[must_use]
    pub fn optimize() -> Self {
        Self {
            operation: Operation::Optimize,
            type_id: None,
            entity_id: None,
            tenant: None,
            routing_key: None,
            document: None,
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

/// External collaborator that translates a root entity into an index
/// document.
///
/// Owned by the mapping layer; the core calls it once per resolved root
/// for add/update operations. Failures are reported as
/// [`IndexError::Mapping`] and are recoverable per item.
pub trait DocumentBuilder: Send + Sync {
    /// Builds the document for one root entity.
    fn build_document(&self, root: &EntityRef) -> IndexResult<Document>;
}

/// Turns resolved root entities into work items.
pub struct WorkBuilder {
    documents: Arc<dyn DocumentBuilder>,
}

impl WorkBuilder {
    /// Creates a work builder over the external document builder.
    pub fn new(documents: Arc<dyn DocumentBuilder>) -> Self {
        Self { documents }
    }

    /// Builds the work items for one root entity and operation.
    ///
    /// Add/update invoke the document builder once per root; delete and
    /// purge build a deletion marker keyed by id (and tenant, when
    /// present) without touching the document builder.
    pub fn build(
        &self,
        root: &EntityRef,
        operation: Operation,
        tenant: Option<&TenantId>,
        routing_key: Option<&RoutingKey>,
    ) -> IndexResult<Vec<WorkItem>> {
        let item = match operation {
            Operation::Add => WorkItem::add(self.documents.build_document(root)?),
            Operation::Update => WorkItem::update(self.documents.build_document(root)?),
            Operation::Delete => WorkItem::delete(root.type_id.clone(), root.entity_id),
            Operation::Purge => WorkItem::purge(root.type_id.clone(), root.entity_id),
            Operation::PurgeAll => WorkItem::purge_all(root.type_id.clone()),
            Operation::Optimize => WorkItem::optimize(),
        };
        let item = match tenant {
            Some(t) => item.with_tenant(t.clone()),
            None => item,
        };
        let item = match routing_key {
            Some(k) => item.with_routing_key(k.clone()),
            None => item,
        };
        Ok(vec![item])
    }
}
