//! Snapshot bootstrap: extraction of a consistent dump and its bulk load into the target.

pub mod extractor;
pub mod progress;
pub mod stage;

/// Workspace prefix of the snapshot part files and of the load-finished marker.
pub const SNAPSHOT_PREFIX: &str = "snapshot";
