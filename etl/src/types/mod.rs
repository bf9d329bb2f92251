//! Common types used throughout the replicator.
//!
//! Source side descriptors are re-exported from the [`tidb`] crate.

mod change;
mod table;

pub use change::*;
pub use table::*;

pub use tidb::types::*;

/// A source-side logical timestamp (TSO) fixing the boundary between snapshot and changes.
pub type ConsistencyPoint = u64;
