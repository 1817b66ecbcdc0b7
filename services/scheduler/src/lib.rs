//! Fleet scheduler library.
//!
//! This crate primarily ships a `scheduler` binary, but the tick pipeline is
//! exposed as a library for integration testing, profiling and the replay
//! tool.
//!
//! One tick turns a [`fleet_model::Snapshot`] into a
//! [`fleet_model::Assignment`]: pre-assignment, the three admission rules,
//! then per-group matching with preemption.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod matcher;
pub mod merge;
pub mod orchestrator;
pub mod perf;
pub mod pre_assign;
pub mod provider;
pub mod quota;
pub mod rules;
pub mod sink;
pub mod worker;
