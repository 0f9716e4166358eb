//! Core engine — types, schemas, topology, planning, execution, results.

pub mod config;
pub mod engine;
pub mod hasher;
pub mod plan;
pub mod planner;
pub mod result;
pub mod runner;
pub mod schema;
pub mod topology;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;
