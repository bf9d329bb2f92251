mod base;
mod capture;
mod replicator;
mod snapshot;
mod source;
mod warehouse;

pub use base::*;
pub use capture::*;
pub use replicator::*;
pub use snapshot::*;
pub use source::*;
pub use warehouse::*;
