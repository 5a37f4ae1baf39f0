//! Component caching.
//!
//! The decomposer stores the compiled node of every component it finishes
//! under a key describing the component's residual clauses. Two schemes are
//! provided:
//!
//! | Scheme | Key | Mapping |
//! |--------|-----|---------|
//! | [`ExactCaching`] | clauses over the real variables | none |
//! | [`RenamingCaching`] | clauses over canonically renumbered variables | real → canonical |
//!
//! A renaming hit hands back the node compiled for an isomorphic component,
//! which the decomposer then reinstantiates through a Mapping node or a
//! structural copy.
//!
//! Both schemes keep their entries in a [`HashMapCache`], which also counts
//! hits and misses.

mod component;
mod hashmap;

pub use component::{compose, CacheEntry, CacheKey, CachingScheme, ComponentCache, ExactCaching, RenamingCaching};
pub use hashmap::HashMapCache;
