//! Coordination primitives shared by the replication components.
//!
//! [`signal`] wraps a tokio watch channel into a payload-free notification, used to stop the
//! progress poller of a bulk load. [`shutdown`] builds the process wide shutdown on top of it.

pub mod shutdown;
pub mod signal;
