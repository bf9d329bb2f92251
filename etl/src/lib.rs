//! Replication of a TiDB table into Snowflake.
//!
//! A replication bootstraps the target from a consistent snapshot and then keeps it in sync by
//! merging the change files a TiCDC changefeed writes into the workspace. Progress between runs
//! is carried by two markers in the workspace only, see [`state`].

pub mod capture;
pub mod concurrency;
pub mod destination;
pub mod error;
pub mod failpoints;
mod macros;
pub mod pipeline;
pub mod replication;
pub mod schema;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
