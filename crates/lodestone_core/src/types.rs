//! Core identifier types.

use std::fmt;
use std::sync::Arc;

/// Name of an indexable or contained entity type.
///
/// Type identifiers are interned strings assigned at graph construction
/// and compared by value. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(Arc<str>);

impl TypeId {
    /// Creates a type identifier from a type name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Unique identifier for an entity within its type.
///
/// Entity IDs are opaque values assigned by the persistence layer.
/// They are never interpreted by the core beyond equality and
/// deterministic hashing for shard routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Creates an entity ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ent:{}", self.0)
    }
}

/// A `(type, id)` pair naming one entity instance.
///
/// The resolver produces sets of `EntityRef`s: the root entities whose
/// index documents must be rebuilt after a change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    /// The entity's type.
    pub type_id: TypeId,
    /// The entity's identifier.
    pub entity_id: EntityId,
}

impl EntityRef {
    /// Creates an entity reference.
    pub fn new(type_id: impl Into<TypeId>, entity_id: EntityId) -> Self {
        Self {
            type_id: type_id.into(),
            entity_id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_id, self.entity_id.as_u64())
    }
}

/// Identifier for one shard of a logical index.
///
/// Shards are numbered from zero and each maps 1:1 to one index
/// manager instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId(pub u32);

impl ShardId {
    /// Creates a shard ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw shard index.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard:{}", self.0)
    }
}

/// Opaque tenant identifier for multi-tenant indexes.
///
/// Passed through unmodified from the persistence layer to the
/// underlying index engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(Arc<str>);

impl TenantId {
    /// Creates a tenant identifier.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the raw tenant value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque routing key used to pick a shard independently of entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(Arc<str>);

impl RoutingKey {
    /// Creates a routing key.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dotted property path on an entity type (e.g. `address.city`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyPath(Arc<str>);

impl PropertyPath {
    /// Creates a property path.
    pub fn new(path: impl Into<Arc<str>>) -> Self {
        Self(path.into())
    }

    /// Returns the raw dotted path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Returns the first path segment.
    #[must_use]
    pub fn head(&self) -> &str {
        self.0.split('.').next().unwrap_or("")
    }

    /// Returns the path after the first segment, if any.
    #[must_use]
    pub fn tail(&self) -> Option<PropertyPath> {
        self.0
            .split_once('.')
            .map(|(_, rest)| PropertyPath::new(rest))
    }

    /// Returns true if the two paths name the same property or one is a
    /// prefix of the other.
    ///
    /// A change reported as `address` affects the dependent path
    /// `address.city`, and a change reported as `address.city` affects a
    /// dependency declared on `address`.
    #[must_use]
    pub fn overlaps(&self, other: &PropertyPath) -> bool {
        let (a, b) = (self.as_str(), other.as_str());
        if a == b {
            return true;
        }
        let (shorter, longer) = if a.len() < b.len() { (a, b) } else { (b, a) };
        longer.starts_with(shorter) && longer.as_bytes().get(shorter.len()) == Some(&b'.')
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropertyPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ref_display() {
        let r = EntityRef::new("Person", EntityId::new(4));
        assert_eq!(format!("{r}"), "Person#4");
    }

    #[test]
    fn shard_id_ordering() {
        let a = ShardId::new(1);
        let b = ShardId::new(2);
        assert!(a < b);
    }

    #[test]
    fn property_path_segments() {
        let path = PropertyPath::new("address.city.name");
        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments, vec!["address", "city", "name"]);
        assert_eq!(path.head(), "address");
        assert_eq!(path.tail().unwrap().as_str(), "city.name");
    }

    #[test]
    fn property_path_overlap() {
        let city = PropertyPath::new("address.city");
        assert!(city.overlaps(&PropertyPath::new("address.city")));
        assert!(city.overlaps(&PropertyPath::new("address")));
        assert!(PropertyPath::new("address").overlaps(&city));
        assert!(!city.overlaps(&PropertyPath::new("addressbook")));
        assert!(!city.overlaps(&PropertyPath::new("name")));
    }

    #[test]
    fn type_id_interning() {
        let a = TypeId::new("Person");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Person");
    }
}
