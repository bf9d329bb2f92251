use std::fmt;

use config::shared::ReplicationMode;

use crate::state::markers::Markers;

/// Coarse phase of a replication job, derived from its markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPhase {
    NotStarted,
    SnapshotLoaded,
    IncrementalRunning,
}

impl ReplicationPhase {
    pub fn derive(markers: Markers) -> ReplicationPhase {
        match (markers.load_finished, markers.capture_registered) {
            (_, true) => ReplicationPhase::IncrementalRunning,
            (true, false) => ReplicationPhase::SnapshotLoaded,
            (false, false) => ReplicationPhase::NotStarted,
        }
    }
}

impl fmt::Display for ReplicationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationPhase::NotStarted => f.write_str("not-started"),
            ReplicationPhase::SnapshotLoaded => f.write_str("snapshot-loaded"),
            ReplicationPhase::IncrementalRunning => f.write_str("incremental-running"),
        }
    }
}

/// What a run has to do, given its mode and the markers found at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    pub phase: ReplicationPhase,
    pub run_snapshot: bool,
    pub register_capture: bool,
    /// Change files are read from this externally created sink instead of the workspace.
    pub external_sink: Option<String>,
    pub run_incremental: bool,
}

impl PhasePlan {
    pub fn new(mode: ReplicationMode, markers: Markers, external_sink: Option<&str>) -> PhasePlan {
        let external_sink = match mode {
            ReplicationMode::IncrementalOnly => external_sink.map(str::to_owned),
            _ => None,
        };

        Self {
            phase: ReplicationPhase::derive(markers),
            run_snapshot: mode.includes_snapshot() && !markers.load_finished,
            register_capture: mode.includes_incremental()
                && !markers.capture_registered
                && external_sink.is_none(),
            external_sink,
            run_incremental: mode.includes_incremental(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(load_finished: bool, capture_registered: bool) -> Markers {
        Markers {
            load_finished,
            capture_registered,
        }
    }

    #[test]
    fn phase_follows_markers() {
        assert_eq!(
            ReplicationPhase::derive(markers(false, false)),
            ReplicationPhase::NotStarted
        );
        assert_eq!(
            ReplicationPhase::derive(markers(true, false)),
            ReplicationPhase::SnapshotLoaded
        );
        assert_eq!(
            ReplicationPhase::derive(markers(true, true)),
            ReplicationPhase::IncrementalRunning
        );
        assert_eq!(
            ReplicationPhase::derive(markers(false, true)),
            ReplicationPhase::IncrementalRunning
        );
    }

    #[test]
    fn fresh_full_run_does_everything() {
        let plan = PhasePlan::new(ReplicationMode::Full, markers(false, false), None);

        assert!(plan.run_snapshot);
        assert!(plan.register_capture);
        assert!(plan.run_incremental);
    }

    #[test]
    fn loaded_snapshot_resumes_at_capture_registration() {
        let plan = PhasePlan::new(ReplicationMode::Full, markers(true, false), None);

        assert_eq!(plan.phase, ReplicationPhase::SnapshotLoaded);
        assert!(!plan.run_snapshot);
        assert!(plan.register_capture);
    }

    #[test]
    fn satisfied_phases_are_skipped() {
        let plan = PhasePlan::new(ReplicationMode::Full, markers(true, true), None);

        assert!(!plan.run_snapshot);
        assert!(!plan.register_capture);
        assert!(plan.run_incremental);
    }

    #[test]
    fn snapshot_only_never_touches_capture() {
        let plan = PhasePlan::new(ReplicationMode::SnapshotOnly, markers(false, false), None);

        assert!(plan.run_snapshot);
        assert!(!plan.register_capture);
        assert!(!plan.run_incremental);
    }

    #[test]
    fn external_sink_skips_registration() {
        let plan = PhasePlan::new(
            ReplicationMode::IncrementalOnly,
            markers(false, false),
            Some("s3://bucket/cdc"),
        );

        assert!(!plan.run_snapshot);
        assert!(!plan.register_capture);
        assert_eq!(plan.external_sink.as_deref(), Some("s3://bucket/cdc"));
        assert!(plan.run_incremental);
    }
}
