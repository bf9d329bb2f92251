//! Change application: merge statements and the applier that runs them.

pub mod incremental;
pub mod merge;
