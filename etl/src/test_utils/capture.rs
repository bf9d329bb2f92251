use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::capture::client::{CaptureClient, CaptureRequest};
use crate::error::{EtlError, EtlResult};
use crate::state::markers::{CAPTURE_METADATA_PATH, CaptureMetadata};
use crate::storage::Workspace;
use crate::types::{ChangeRow, TableDefinition};

#[derive(Debug, Default)]
struct Inner {
    requests: Vec<CaptureRequest>,
    failure: Option<EtlError>,
}

/// Capture client that records registrations.
///
/// Like the real service, a successful registration writes the capture metadata into the
/// workspace with the checkpoint set to the start point of the job.
#[derive(Debug, Clone)]
pub struct MemoryCaptureClient {
    workspace: Workspace,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCaptureClient {
    pub fn new(workspace: Workspace) -> MemoryCaptureClient {
        Self {
            workspace,
            inner: Arc::default(),
        }
    }

    /// Fails every later registration with `error`.
    pub async fn fail_with(&self, error: EtlError) {
        self.inner.lock().await.failure = Some(error);
    }

    pub async fn requests(&self) -> Vec<CaptureRequest> {
        self.inner.lock().await.requests.clone()
    }
}

impl CaptureClient for MemoryCaptureClient {
    async fn register(&self, request: &CaptureRequest) -> EtlResult<String> {
        {
            let mut inner = self.inner.lock().await;
            if let Some(error) = inner.failure.clone() {
                return Err(error);
            }
            inner.requests.push(request.clone());
        }

        write_checkpoint(&self.workspace, CAPTURE_METADATA_PATH, request.start_ts).await?;

        Ok(request.changefeed_id.clone())
    }
}

/// Writes capture metadata with `checkpoint_ts` at `path`.
pub async fn write_checkpoint(
    workspace: &Workspace,
    path: &str,
    checkpoint_ts: u64,
) -> EtlResult<()> {
    let metadata = CaptureMetadata { checkpoint_ts };
    workspace.put(path, serde_json::to_vec(&metadata)?).await
}

/// Publishes `definition` under `prefix` in the layout of the capture service.
pub async fn publish_definition(
    workspace: &Workspace,
    prefix: &str,
    definition: &TableDefinition,
    action_type: u64,
) -> EtlResult<()> {
    let columns: Vec<Value> = definition
        .columns
        .iter()
        .map(|column| {
            json!({
                "ColumnId": column.id.map(|id| id.to_string()),
                "ColumnName": column.name,
                "ColumnType": column.data_type.to_uppercase(),
                "ColumnPrecision": column.precision.map(|precision| precision.to_string()),
                "ColumnScale": column.scale.map(|scale| scale.to_string()),
                "ColumnNullable": if column.nullable { Value::Null } else { json!("false") },
                "ColumnIsPk": if column.primary_key { json!("true") } else { Value::Null },
                "ColumnDefault": column.default,
            })
        })
        .collect();

    let file = json!({
        "Table": definition.table,
        "Schema": definition.schema,
        "Version": 1,
        "TableVersion": definition.version,
        "Query": definition.query.clone().unwrap_or_default(),
        "Type": action_type,
        "TableColumns": columns,
        "TableColumnsTotal": definition.columns.len(),
    });

    let path = join(
        prefix,
        &format!(
            "{}/{}/meta/schema_{}_0000000000.json",
            definition.schema, definition.table, definition.version
        ),
    );
    workspace.put(&path, serde_json::to_vec(&file)?).await
}

/// Publishes `rows` as change file `index` of the version of `definition`.
///
/// Returns the path of the file.
pub async fn publish_changes(
    workspace: &Workspace,
    prefix: &str,
    definition: &TableDefinition,
    index: u64,
    rows: &[ChangeRow],
) -> EtlResult<String> {
    let content: String = rows
        .iter()
        .map(|row| {
            let mut fields = vec![
                format!("\"{}\"", row.flag),
                format!("\"{}\"", definition.table),
                format!("\"{}\"", definition.schema),
                row.ordering_key.to_string(),
            ];
            fields.extend(row.values.iter().map(|value| match value {
                Some(value) => format!("\"{}\"", value.replace('"', "\"\"")),
                None => "\\N".to_owned(),
            }));
            fields.join(",") + "\n"
        })
        .collect();

    let path = join(
        prefix,
        &format!(
            "{}/{}/{}/CDC{index:06}.csv",
            definition.schema, definition.table, definition.version
        ),
    );
    workspace.put(&path, content).await?;

    Ok(path)
}

fn join(prefix: &str, relative: &str) -> String {
    match prefix.trim_matches('/') {
        "" => relative.to_owned(),
        prefix => format!("{prefix}/{relative}"),
    }
}
