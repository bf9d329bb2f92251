//! Warehouse abstractions.
//!
//! The [`Warehouse`] trait executes SQL against the analytical target. [`snowflake`] implements
//! it over the Snowflake SQL API; [`memory`] records statements for tests and dry runs.

mod base;
pub mod memory;
pub mod snowflake;
pub mod stage;

pub use base::{QueryResult, Warehouse, apply_statements, target_column_names};
