//! Schema change handling: column diffs, target type mapping and DDL translation.

pub mod ddl;
pub mod dialect;
pub mod diff;
pub mod sql;
