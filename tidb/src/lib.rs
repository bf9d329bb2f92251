//! TiDB source access for the replicator.
//!
//! TiDB speaks the MySQL protocol, so every query goes through [`sqlx`]'s MySQL driver. The crate
//! exposes connection options, table identifiers and the few introspection queries needed to
//! bootstrap a replication: the current consistency point and the columns of a table as of a
//! given consistency point.

pub mod connection;
pub mod error;
pub mod schema;
pub mod types;
