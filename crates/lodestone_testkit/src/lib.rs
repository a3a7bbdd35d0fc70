//! # Lodestone Testkit
//!
//! Test utilities for Lodestone.
//!
//! This crate provides:
//! - Shared fixtures: the genealogy dependency graph and its
//!   association/document stores
//! - An in-memory recording index backend with latency and failure
//!   injection
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lodestone_testkit::prelude::*;
//!
//! #[test]
//! fn resolves_ancestors() {
//!     let graph = genealogy_graph(2);
//!     let store = GenealogyStore::new();
//!     // ... resolve against the fixture
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backend::MemoryBackend;
    pub use crate::fixtures::{genealogy_graph, GenealogyStore, GENEALOGY_SIZE};
    pub use crate::generators::{entity_id_strategy, property_path_strategy, type_name_strategy};
}
