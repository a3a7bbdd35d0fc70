//! Property-based test generators using proptest.

use lodestone_core::types::{EntityId, PropertyPath};
use proptest::prelude::*;

/// Strategy for generating entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    any::<u64>().prop_map(EntityId::new)
}

/// Strategy for generating valid entity type names.
pub fn type_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for generating dotted property paths of 1..=3 segments.
pub fn property_path_strategy() -> impl Strategy<Value = PropertyPath> {
    prop::collection::vec(
        prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex"),
        1..=3,
    )
    .prop_map(|segments| PropertyPath::new(segments.join(".")))
}
