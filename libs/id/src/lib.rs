//! # fleet-id
//!
//! Typed identifiers and labels shared by every fleet crate.
//!
//! ## Design Principles
//!
//! - Task ids are system-generated monotonic integers; everything else
//!   (node names, user names, group labels, chain ids) is an externally
//!   supplied label
//! - Labels are typed so a node name can never be passed where a group is
//!   expected
//! - Strict parsing (`FromStr`) rejects empty or whitespace-bearing labels;
//!   deserialization is lenient because inventory data is semi-structured
//!
//! ## Examples
//!
//! - `TaskId`: `1042`
//! - `NodeName`: `gpu-a100-017`
//! - `GroupName`: `jd_a100`
//! - `ChainId`: `exp-7f3c`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use macros::MAX_LABEL_LEN;
pub use types::*;
