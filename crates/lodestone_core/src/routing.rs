//! Sharding router.
//!
//! Deterministically maps `(entity id, routing key)` to shard
//! identifiers. Strategies are a closed set of variants plus one
//! explicit custom hook; determinism is a hard requirement for every
//! strategy, because the same inputs must reach the same shard across
//! calls and across process restarts or routed deletes and updates
//! silently corrupt the index.

use crate::error::{IndexError, IndexResult};
use crate::types::{EntityId, RoutingKey, ShardId, TypeId};
use crate::work::WorkItem;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// User-supplied shard selection hook.
///
/// Implementations **must** be deterministic: the same inputs must
/// always produce the same shard sequence. The router does not verify
/// this.
pub trait ShardSelector: Send + Sync {
    /// Called once when the router is created.
    fn initialize(&self, shard_count: u32) -> IndexResult<()> {
        let _ = shard_count;
        Ok(())
    }

    /// Selects the shards for one operation.
    fn select(
        &self,
        type_id: Option<&TypeId>,
        entity_id: Option<&EntityId>,
        routing_key: Option<&RoutingKey>,
    ) -> Vec<ShardId>;
}

/// Shard selection strategy.
#[derive(Clone)]
pub enum ShardingStrategy {
    /// Single shard; every operation targets shard 0.
    NotSharded,
    /// `fold64(sha256(id)) % shard_count`; stable across processes.
    IdHash {
        /// Number of shards.
        shard_count: u32,
    },
    /// User-supplied selector over a fixed shard count.
    Custom {
        /// Number of shards.
        shard_count: u32,
        /// The selection hook.
        selector: Arc<dyn ShardSelector>,
    },
}

impl ShardingStrategy {
    /// Returns the number of shards this strategy spreads over.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        match self {
            Self::NotSharded => 1,
            Self::IdHash { shard_count } | Self::Custom { shard_count, .. } => *shard_count,
        }
    }
}

// Manual impl: `Arc<dyn ShardSelector>` has no Debug.
impl fmt::Debug for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSharded => f.write_str("NotSharded"),
            Self::IdHash { shard_count } => {
                write!(f, "IdHash {{ shard_count: {shard_count} }}")
            }
            Self::Custom { shard_count, .. } => {
                write!(f, "Custom {{ shard_count: {shard_count} }}")
            }
        }
    }
}

/// Deterministic 64-bit fold of an entity id or routing key.
///
/// SHA-256 keeps the mapping stable across platforms and process
/// restarts; the first eight digest bytes are folded big-endian.
fn stable_hash(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut folded = [0u8; 8];
    folded.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(folded)
}

/// Routes work items to shards.
#[derive(Debug, Clone)]
pub struct Router {
    strategy: ShardingStrategy,
}

impl Router {
    /// Creates a router, initializing a custom selector if present.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] for a zero shard count, or
    /// whatever the custom selector's `initialize` reports.
    pub fn new(strategy: ShardingStrategy) -> IndexResult<Self> {
        if strategy.shard_count() == 0 {
            return Err(IndexError::configuration(
                "sharding_strategy.nbr_of_shards must be at least 1",
            ));
        }
        if let ShardingStrategy::Custom {
            shard_count,
            selector,
        } = &strategy
        {
            selector.initialize(*shard_count)?;
        }
        Ok(Self { strategy })
    }

    /// Returns the shard count.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.strategy.shard_count()
    }

    /// Routes one per-id operation to exactly one shard.
    ///
    /// The routing key, when present, takes precedence over the entity
    /// id as hash input.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Routing`] if the strategy yields zero
    /// shards or more than one shard for a per-id operation.
    pub fn route_one(
        &self,
        type_id: &TypeId,
        entity_id: &EntityId,
        routing_key: Option<&RoutingKey>,
    ) -> IndexResult<ShardId> {
        let shards = match &self.strategy {
            ShardingStrategy::NotSharded => vec![ShardId::new(0)],
            ShardingStrategy::IdHash { shard_count } => {
                let hash = match routing_key {
                    Some(key) => stable_hash(key.as_str().as_bytes()),
                    None => stable_hash(&entity_id.as_u64().to_be_bytes()),
                };
                vec![ShardId::new((hash % u64::from(*shard_count)) as u32)]
            }
            ShardingStrategy::Custom { selector, .. } => {
                selector.select(Some(type_id), Some(entity_id), routing_key)
            }
        };
        match shards.as_slice() {
            [single] => Ok(*single),
            [] => Err(IndexError::routing(format!(
                "strategy returned zero shards for {type_id}#{}",
                entity_id.as_u64()
            ))),
            many => Err(IndexError::routing(format!(
                "strategy returned {} shards for per-id operation on {type_id}#{}",
                many.len(),
                entity_id.as_u64()
            ))),
        }
    }

    /// Routes a broadcast operation to every shard, ascending.
    #[must_use]
    pub fn route_all(&self) -> Vec<ShardId> {
        (0..self.shard_count()).map(ShardId::new).collect()
    }

    /// Routes one work item: broadcast operations go to every shard,
    /// per-id operations to exactly one.
    pub fn route(&self, item: &WorkItem) -> IndexResult<Vec<ShardId>> {
        if item.operation.is_broadcast() {
            return Ok(self.route_all());
        }
        let Some(entity_id) = item.entity_id else {
            return Err(IndexError::routing(format!(
                "per-id operation {:?} carries no entity id",
                item.operation
            )));
        };
        let Some(type_id) = &item.type_id else {
            return Err(IndexError::routing(format!(
                "per-id operation {:?} carries no entity type",
                item.operation
            )));
        };
        Ok(vec![self.route_one(
            type_id,
            &entity_id,
            item.routing_key.as_ref(),
        )?])
    }
}

/// Bootstrap-built, immutable mapping of one logical index to its
/// ordered shard list. Reconfiguration never changes the shard count.
#[derive(Debug, Clone)]
pub struct ShardAssignment {
    index_name: String,
    shards: Vec<ShardId>,
}

impl ShardAssignment {
    /// Creates the assignment for an index with the given shard count.
    pub fn new(index_name: impl Into<String>, shard_count: u32) -> Self {
        Self {
            index_name: index_name.into(),
            shards: (0..shard_count).map(ShardId::new).collect(),
        }
    }

    /// Returns the index name.
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the ordered shard list.
    #[must_use]
    pub fn shards(&self) -> &[ShardId] {
        &self.shards
    }

    /// Returns the shard count.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_hash_router(shards: u32) -> Router {
        Router::new(ShardingStrategy::IdHash {
            shard_count: shards,
        })
        .unwrap()
    }

    #[test]
    fn not_sharded_always_selects_zero() {
        let router = Router::new(ShardingStrategy::NotSharded).unwrap();
        let person = TypeId::new("Person");
        for id in 0..50 {
            let shard = router
                .route_one(&person, &EntityId::new(id), None)
                .unwrap();
            assert_eq!(shard, ShardId::new(0));
        }
    }

    #[test]
    fn id_hash_is_deterministic() {
        let a = id_hash_router(4);
        let b = id_hash_router(4);
        let person = TypeId::new("Person");
        for id in 0..100 {
            let id = EntityId::new(id);
            assert_eq!(
                a.route_one(&person, &id, None).unwrap(),
                b.route_one(&person, &id, None).unwrap()
            );
        }
    }

    #[test]
    fn id_hash_spreads_over_shards() {
        let router = id_hash_router(4);
        let person = TypeId::new("Person");
        let mut seen = std::collections::HashSet::new();
        for id in 0..200 {
            seen.insert(router.route_one(&person, &EntityId::new(id), None).unwrap());
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn routing_key_takes_precedence() {
        let router = id_hash_router(8);
        let person = TypeId::new("Person");
        let key = RoutingKey::new("tenant-7");
        let a = router
            .route_one(&person, &EntityId::new(1), Some(&key))
            .unwrap();
        let b = router
            .route_one(&person, &EntityId::new(2), Some(&key))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_shards_from_custom_is_routing_error() {
        struct Empty;
        impl ShardSelector for Empty {
            fn select(
                &self,
                _: Option<&TypeId>,
                _: Option<&EntityId>,
                _: Option<&RoutingKey>,
            ) -> Vec<ShardId> {
                Vec::new()
            }
        }
        let router = Router::new(ShardingStrategy::Custom {
            shard_count: 2,
            selector: Arc::new(Empty),
        })
        .unwrap();
        let err = router
            .route_one(&TypeId::new("Person"), &EntityId::new(1), None)
            .unwrap_err();
        assert!(matches!(err, IndexError::Routing { .. }));
    }

    #[test]
    fn zero_shard_count_is_configuration_error() {
        let err = Router::new(ShardingStrategy::IdHash { shard_count: 0 }).unwrap_err();
        assert!(matches!(err, IndexError::Configuration { .. }));
    }

    #[test]
    fn broadcast_routes_to_all_shards_ascending() {
        let router = id_hash_router(3);
        let shards = router.route(&WorkItem::optimize()).unwrap();
        assert_eq!(
            shards,
            vec![ShardId::new(0), ShardId::new(1), ShardId::new(2)]
        );
    }

    #[test]
    fn assignment_is_ordered() {
        let assignment = ShardAssignment::new("books", 3);
        assert_eq!(assignment.index_name(), "books");
        assert_eq!(assignment.shard_count(), 3);
        assert_eq!(assignment.shards()[2], ShardId::new(2));
    }
}
