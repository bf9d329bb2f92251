//! Durable replication state.
//!
//! A replication job persists nothing but two presence markers in its workspace. The phase of a
//! run is derived from them every time the job starts:
//!
//! ```text
//! ┌────────────┐  snapshot/loadinfo   ┌────────────────┐  increment/metadata  ┌─────────────────────┐
//! │ NotStarted │ ───────────────────> │ SnapshotLoaded │ ───────────────────> │ IncrementalRunning  │
//! └────────────┘                      └────────────────┘                      └─────────────────────┘
//! ```
//!
//! `snapshot/loadinfo` is written once every snapshot part has been loaded. `increment/metadata`
//! is written by the change-capture service once a capture job writes into the workspace.

pub mod markers;
pub mod phase;
