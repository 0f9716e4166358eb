//! topoquery — topology-aware path queries over typed remote resources.
//!
//! A query names the resource types it is interested in; the engine finds the declared
//! links between them, fetches concurrently through pluggable readers, and assembles a
//! parent/child result tree.

pub mod cli;
pub mod core;
pub mod error;
pub mod query;
pub mod reader;
pub mod render;
