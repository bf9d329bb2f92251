use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EtlResult;
use crate::storage::Workspace;
use crate::types::ConsistencyPoint;

/// Workspace path of the load-finished marker.
pub const LOAD_INFO_PATH: &str = "snapshot/loadinfo";

/// Workspace path of the capture-metadata marker.
pub const CAPTURE_METADATA_PATH: &str = "increment/metadata";

/// Content of the load-finished marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadInfo {
    /// Consistency point the snapshot was taken at.
    pub consistency_point: ConsistencyPoint,
    pub parts: usize,
    pub rows_loaded: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Metadata the change-capture service keeps next to its change files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// Every change committed at or before this point has been flushed to change files.
    #[serde(rename = "checkpoint-ts")]
    pub checkpoint_ts: u64,
}

/// Presence of the two markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Markers {
    pub load_finished: bool,
    pub capture_registered: bool,
}

/// Reads and writes the durable markers of a workspace.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    workspace: Workspace,
}

impl MarkerStore {
    pub fn new(workspace: Workspace) -> MarkerStore {
        Self { workspace }
    }

    /// Probes both markers.
    pub async fn read(&self) -> EtlResult<Markers> {
        let markers = Markers {
            load_finished: self.workspace.exists(LOAD_INFO_PATH).await?,
            capture_registered: self.workspace.exists(CAPTURE_METADATA_PATH).await?,
        };

        info!(
            load_finished = markers.load_finished,
            capture_registered = markers.capture_registered,
            "read replication markers"
        );

        Ok(markers)
    }

    /// Returns the load-finished marker content.
    ///
    /// An unreadable marker still counts as present, its content is then `None`.
    pub async fn load_info(&self) -> EtlResult<Option<LoadInfo>> {
        if !self.workspace.exists(LOAD_INFO_PATH).await? {
            return Ok(None);
        }

        let bytes = self.workspace.get(LOAD_INFO_PATH).await?;
        match serde_json::from_slice(&bytes) {
            Ok(load_info) => Ok(Some(load_info)),
            Err(err) => {
                warn!(error = %err, path = LOAD_INFO_PATH, "load marker content is unreadable");
                Ok(None)
            }
        }
    }

    pub async fn write_load_info(&self, load_info: &LoadInfo) -> EtlResult<()> {
        let bytes = serde_json::to_vec(load_info)?;
        self.workspace.put(LOAD_INFO_PATH, bytes).await?;

        info!(
            consistency_point = load_info.consistency_point,
            rows_loaded = load_info.rows_loaded,
            "wrote load-finished marker"
        );

        Ok(())
    }

    pub async fn capture_metadata(&self) -> EtlResult<Option<CaptureMetadata>> {
        read_capture_metadata(&self.workspace, CAPTURE_METADATA_PATH).await
    }
}

/// Reads the capture metadata at `path`, `None` when the capture service has not written it yet.
pub async fn read_capture_metadata(
    workspace: &Workspace,
    path: &str,
) -> EtlResult<Option<CaptureMetadata>> {
    if !workspace.exists(path).await? {
        return Ok(None);
    }

    let bytes = workspace.get(path).await?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}
