//! Bulk load of snapshot part files through a warehouse stage.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::bail;
use crate::destination::Warehouse;
use crate::destination::stage::{CSV_FILE_FORMAT, Stage, StageCredentials};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::schema::sql::{quote_identifier, quote_string};
use crate::snapshot::SNAPSHOT_PREFIX;
use crate::snapshot::progress::{PROGRESS_POLL_INTERVAL, ProgressCallback, ProgressPoller};
use crate::storage::Workspace;
use crate::types::TableName;

/// Query returning the warehouse clock in a format `TIMESTAMP_LTZ` casts read back unchanged.
pub const SERVER_TIMESTAMP_QUERY: &str =
    "SELECT TO_VARCHAR(CURRENT_TIMESTAMP(), 'YYYY-MM-DD\"T\"HH24:MI:SS.FF9TZH:TZM')";

/// Outcome of a snapshot load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub parts: usize,
    pub rows_loaded: u64,
    pub errors_seen: u64,
}

/// Returns `true` for part files named `<schema>.<table>.<n>.csv`.
pub fn is_snapshot_part(file_name: &str, table: &TableName) -> bool {
    file_name
        .strip_prefix(table.schema.as_str())
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_prefix(table.name.as_str()))
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".csv"))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

/// Name of the stage holding the snapshot of `table`.
pub fn snapshot_stage_name(table: &str) -> String {
    format!("snapshot_stage_{table}")
}

/// Loads the snapshot parts of one table from the workspace into its target table.
///
/// The stage only exists for the duration of [`StageManager::load`]: it is created once the
/// parts are known and dropped after the last part, or after the first failed one.
#[derive(Debug)]
pub struct StageManager<W> {
    warehouse: W,
    workspace: Workspace,
    source: TableName,
    target: String,
    stage: Stage,
    poll_interval: Duration,
}

impl<W> StageManager<W>
where
    W: Warehouse + Clone + Send + Sync + 'static,
{
    pub fn new(
        warehouse: W,
        workspace: Workspace,
        source: TableName,
        target: impl Into<String>,
        credentials: StageCredentials,
    ) -> StageManager<W> {
        let target = target.into();
        let stage = Stage::new(
            snapshot_stage_name(&target),
            &workspace.url_for(SNAPSHOT_PREFIX),
            credentials,
        )
        .with_allowed_location(workspace.url());

        Self {
            warehouse,
            workspace,
            source,
            target,
            stage,
            poll_interval: PROGRESS_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Lists the part files, relative to the snapshot prefix, in name order.
    pub async fn list_parts(&self) -> EtlResult<Vec<String>> {
        let prefix = format!("{SNAPSHOT_PREFIX}/");
        let parts = self
            .workspace
            .list(SNAPSHOT_PREFIX)
            .await?
            .into_iter()
            .filter_map(|path| path.strip_prefix(&prefix).map(str::to_owned))
            .filter(|file_name| is_snapshot_part(file_name, &self.source))
            .collect();

        Ok(parts)
    }

    /// Loads every part file and returns the aggregated outcome.
    ///
    /// `callback` receives the cumulative rows produced across parts while a part is loading.
    pub async fn load(&self, callback: Option<ProgressCallback>) -> EtlResult<LoadSummary> {
        let parts = self.list_parts().await?;
        if parts.is_empty() {
            bail!(
                ErrorKind::NoSnapshotFiles,
                "No files found to load",
                format!(
                    "no `{}.<n>.csv` part under `{}`",
                    self.source,
                    self.workspace.url_for(SNAPSHOT_PREFIX)
                )
            );
        }

        info!(table = %self.source, parts = parts.len(), stage = self.stage.name(), "loading snapshot");

        self.stage.create(&self.warehouse).await?;
        let result = self.load_parts(&parts, callback).await;
        self.stage.drop_quietly(&self.warehouse).await;

        let summary = result?;
        info!(
            table = %self.source,
            parts = summary.parts,
            rows_loaded = summary.rows_loaded,
            errors_seen = summary.errors_seen,
            "loaded snapshot"
        );

        Ok(summary)
    }

    async fn load_parts(
        &self,
        parts: &[String],
        callback: Option<ProgressCallback>,
    ) -> EtlResult<LoadSummary> {
        let mut summary = LoadSummary::default();

        for part in parts {
            let loaded_before = summary.rows_loaded;
            let part_callback = callback.clone().map(|callback| -> ProgressCallback {
                Arc::new(move |rows| callback(loaded_before + rows))
            });

            let (rows_loaded, errors_seen) = self.load_part(part, part_callback).await?;
            summary.parts += 1;
            summary.rows_loaded += rows_loaded;
            summary.errors_seen += errors_seen;

            if let Some(callback) = &callback {
                callback(summary.rows_loaded);
            }
        }

        Ok(summary)
    }

    async fn load_part(
        &self,
        part: &str,
        callback: Option<ProgressCallback>,
    ) -> EtlResult<(u64, u64)> {
        let horizon = self.warehouse.execute(SERVER_TIMESTAMP_QUERY).await?;
        let Some(horizon) = horizon.scalar().map(str::to_owned) else {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Warehouse returned no server timestamp"
            );
        };

        let load_id = format!("load-id={}", Uuid::new_v4());
        let sql = copy_statement(&self.target, self.stage.name(), part, &load_id);

        let poller = ProgressPoller::start(
            self.warehouse.clone(),
            &horizon,
            &load_id,
            self.poll_interval,
            callback,
        );
        let result = self.warehouse.execute(&sql).await;
        poller.stop().await;

        let result = result.map_err(|err| {
            etl_error!(
                ErrorKind::BulkLoadFailed,
                "Snapshot part failed to load",
                format!("part `{part}`"),
                source: err
            )
        })?;

        let mut processed = false;
        let mut rows_loaded = 0;
        let mut errors_seen = 0;
        for row in 0..result.rows.len() {
            let Some(file) = result.get(row, "file").filter(|file| is_loaded_part(file, part))
            else {
                continue;
            };
            match result.get(row, "status") {
                Some("LOADED") => {}
                Some("PARTIALLY_LOADED") => warn!(
                    file,
                    first_error = result.get(row, "first_error").unwrap_or_default(),
                    "snapshot part was partially loaded, rejected rows were skipped"
                ),
                status => bail!(
                    ErrorKind::BulkLoadFailed,
                    "Snapshot part failed to load",
                    format!(
                        "`{file}` ended with status `{}`: {}",
                        status.unwrap_or("unknown"),
                        result.get(row, "first_error").unwrap_or("no error reported")
                    )
                ),
            }
            processed = true;
            rows_loaded += parse_count(result.get(row, "rows_loaded"))?;
            errors_seen += parse_count(result.get(row, "errors_seen"))?;
        }

        // A part the stage cannot see is skipped by the warehouse without an error.
        if !processed {
            bail!(
                ErrorKind::BulkLoadFailed,
                "Snapshot part was not processed by the warehouse",
                format!(
                    "no load result for `{part}` through `{}`: {}",
                    self.stage.url(),
                    result.scalar().unwrap_or("empty result")
                )
            );
        }

        info!(part, rows_loaded, errors_seen, "loaded snapshot part");

        Ok((rows_loaded, errors_seen))
    }
}

/// Renders the bulk load of one staged part, tagged with `load_id` for progress attribution.
pub fn copy_statement(target: &str, stage: &str, part: &str, load_id: &str) -> String {
    format!(
        "COPY INTO {} -- {load_id}\nFROM @{} FILES = ({}) FILE_FORMAT = ({CSV_FILE_FORMAT}) ON_ERROR = CONTINUE;",
        quote_identifier(target),
        quote_identifier(stage),
        quote_string(part)
    )
}

/// Returns `true` when `file`, as reported by the warehouse, is the staged `part`.
fn is_loaded_part(file: &str, part: &str) -> bool {
    file == part || file.ends_with(&format!("/{part}"))
}

fn parse_count(value: Option<&str>) -> EtlResult<u64> {
    match value {
        Some(value) => Ok(value.parse()?),
        None => Ok(0),
    }
}
