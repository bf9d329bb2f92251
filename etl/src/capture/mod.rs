//! Change-capture integration: job registration and the files a capture job writes.

pub mod client;
pub mod definition;
pub mod layout;
pub mod sink;

/// Workspace prefix the capture service writes change files to.
pub const INCREMENT_PREFIX: &str = "increment";
