//! # fleet-testing
//!
//! Snapshot fixtures for scheduler tests, benchmarks and replay.
//!
//! - [`generate`] builds a large, internally consistent snapshot from a
//!   seed; the same [`GenConfig`] always yields the same snapshot
//! - [`ClusterBuilder`] assembles small hand-written scenarios

mod builder;
mod generator;

pub use builder::{quota_for, task, ClusterBuilder};
pub use generator::{generate, GenConfig, GEN_GROUP};
