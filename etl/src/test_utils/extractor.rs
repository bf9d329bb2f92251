use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::snapshot::SNAPSHOT_PREFIX;
use crate::snapshot::extractor::{ExtractRequest, SnapshotExtractor};
use crate::storage::Workspace;

#[derive(Debug, Default)]
struct Inner {
    requests: Vec<ExtractRequest>,
    fail: bool,
}

/// Extractor writing fixed part files into a workspace.
#[derive(Debug, Clone)]
pub struct MemorySnapshotExtractor {
    workspace: Workspace,
    parts: Arc<Vec<String>>,
    inner: Arc<Mutex<Inner>>,
}

impl MemorySnapshotExtractor {
    /// Each entry of `parts` becomes the content of one part file.
    pub fn new(workspace: Workspace, parts: Vec<String>) -> MemorySnapshotExtractor {
        Self {
            workspace,
            parts: Arc::new(parts),
            inner: Arc::default(),
        }
    }

    /// Makes the next extractions fail like a crashed dump tool.
    pub async fn fail(&self) {
        self.inner.lock().await.fail = true;
    }

    pub async fn requests(&self) -> Vec<ExtractRequest> {
        self.inner.lock().await.requests.clone()
    }
}

impl SnapshotExtractor for MemorySnapshotExtractor {
    async fn extract(&self, request: &ExtractRequest) -> EtlResult<()> {
        let fail = {
            let mut inner = self.inner.lock().await;
            inner.requests.push(request.clone());
            inner.fail
        };
        if fail {
            return Err(etl_error!(
                ErrorKind::SnapshotExtractionFailed,
                "Snapshot extraction failed",
                "dump tool exited with status 1"
            ));
        }

        for (index, content) in self.parts.iter().enumerate() {
            let path = format!(
                "{SNAPSHOT_PREFIX}/{}.{}.{index:09}.csv",
                request.table.schema, request.table.name
            );
            self.workspace.put(&path, content.clone()).await?;
        }

        Ok(())
    }
}
