//! In-memory collaborators for exercising replications without TiDB, Snowflake or TiCDC.
//!
//! - [`capture`] registers capture jobs in memory and publishes change files like TiCDC does.
//! - [`extractor`] writes snapshot parts straight into a workspace.
//! - [`source`] answers with a fixed consistency point and column set.
//! - [`materialize`] evaluates merges and single-row application against an in-memory table.
//! - [`pipeline`] wires all of them into a replication pipeline.
//!
//! The warehouse counterpart is [`crate::destination::memory::MemoryWarehouse`].

pub mod capture;
pub mod extractor;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod materialize;
pub mod pipeline;
pub mod source;

pub use crate::destination::memory::MemoryWarehouse;
