//! Continuous application of change files to the target table.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bail;
use crate::capture::definition::parse_table_definition;
use crate::capture::layout::ChangeLayout;
use crate::concurrency::shutdown::{ShutdownRx, shutdown_requested, wait_for_shutdown};
use crate::destination::stage::{Stage, StageCredentials};
use crate::destination::{Warehouse, apply_statements, target_column_names};
use crate::error::{ErrorKind, EtlResult};
use crate::failpoints::{INCREMENTAL_APPLY__AFTER_MERGE, etl_fail_point};
use crate::replication::merge::MergePlan;
use crate::schema::ddl::DdlTranslator;
use crate::state::markers::read_capture_metadata;
use crate::storage::Workspace;
use crate::types::{TableDefinition, TableName};

/// Name of the stage holding the change files of `table`.
pub fn increment_stage_name(table: &str) -> String {
    format!("increment_stage_{table}")
}

/// Location of the change files of a capture job.
#[derive(Debug, Clone)]
pub struct ChangeSource {
    workspace: Workspace,
    prefix: String,
}

impl ChangeSource {
    /// Change files under `prefix` of `workspace`. An empty prefix is the workspace root.
    pub fn new(workspace: Workspace, prefix: impl Into<String>) -> ChangeSource {
        Self {
            workspace,
            prefix: prefix.into().trim_matches('/').to_owned(),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn url(&self) -> String {
        self.workspace.url_for(&self.prefix)
    }

    fn metadata_path(&self) -> String {
        self.join("metadata")
    }

    fn join(&self, relative: &str) -> String {
        match self.prefix.as_str() {
            "" => relative.to_owned(),
            prefix => format!("{prefix}/{relative}"),
        }
    }

    /// Path of `path` relative to the change source, as seen from a stage over it.
    fn stage_path<'a>(&self, path: &'a str) -> &'a str {
        match self.prefix.as_str() {
            "" => path,
            prefix => path
                .strip_prefix(prefix)
                .map_or(path, |rest| rest.trim_start_matches('/')),
        }
    }
}

/// Result of one application round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Waiting for more change files.
    Pending,
    /// The table was dropped, nothing more will arrive.
    Finished,
}

#[derive(Debug)]
struct ApplierState {
    version: u64,
    definition: TableDefinition,
    applied: HashSet<String>,
}

impl ApplierState {
    fn new(definition: TableDefinition) -> ApplierState {
        Self {
            version: definition.version,
            definition,
            applied: HashSet::new(),
        }
    }
}

/// Applies the change files of one table, version by version.
///
/// Change files of a version are merged in write order. The applier moves to the next version
/// only once the capture checkpoint has passed it, which guarantees that every change file of the
/// current version has been written. Moving translates the schema change into DDL and applies it
/// before any change file of the new version is merged.
///
/// Progress is held in memory only. After a restart the resumption point is recovered from the
/// target's columns and files are merged again, which converges thanks to idempotent merges.
#[derive(Debug)]
pub struct IncrementalApplier<W> {
    warehouse: W,
    source: ChangeSource,
    table: TableName,
    target: String,
    translator: DdlTranslator,
    stage: Stage,
    poll_interval: Duration,
    state: Option<ApplierState>,
}

impl<W> IncrementalApplier<W>
where
    W: Warehouse + Send + Sync,
{
    pub fn new(
        warehouse: W,
        source: ChangeSource,
        table: TableName,
        target: impl Into<String>,
        translator: DdlTranslator,
        credentials: StageCredentials,
        poll_interval: Duration,
    ) -> IncrementalApplier<W> {
        let target = target.into();
        let stage = Stage::new(increment_stage_name(&target), &source.url(), credentials)
            .with_allowed_location(source.workspace().url());

        Self {
            warehouse,
            source,
            table,
            target,
            translator,
            stage,
            poll_interval,
            state: None,
        }
    }

    /// Version the applier is currently merging, once known.
    pub fn current_version(&self) -> Option<u64> {
        self.state.as_ref().map(|state| state.version)
    }

    /// Runs application rounds every poll interval until shutdown or until the table is dropped.
    pub async fn run(mut self, mut shutdown_rx: ShutdownRx) -> EtlResult<()> {
        self.stage.create(&self.warehouse).await?;
        info!(table = %self.table, stage = self.stage.name(), "started change application");

        let result = loop {
            if shutdown_requested(&shutdown_rx) {
                break Ok(());
            }

            match self.apply_available().await {
                Ok(ApplyOutcome::Finished) => break Ok(()),
                Ok(ApplyOutcome::Pending) => {}
                Err(err) => break Err(err),
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => break Ok(()),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        };

        self.stage.drop_quietly(&self.warehouse).await;
        info!(table = %self.table, "stopped change application");

        result
    }

    /// Runs one application round over the files currently in the change source.
    pub async fn apply_available(&mut self) -> EtlResult<ApplyOutcome> {
        // The checkpoint is read before listing: every file it covers is then part of the listing.
        let checkpoint = read_capture_metadata(self.source.workspace(), &self.source.metadata_path())
            .await?
            .map(|metadata| metadata.checkpoint_ts)
            .unwrap_or_default();
        let paths = self.source.workspace().list(&self.source.prefix).await?;
        let layout = ChangeLayout::from_paths(paths, &self.source.prefix, &self.table);

        if self.state.is_none() {
            let Some(state) = self.resume(&layout, checkpoint).await? else {
                debug!(table = %self.table, "no table definition published yet");
                return Ok(ApplyOutcome::Pending);
            };
            self.state = Some(state);
        }

        self.merge_pending(&layout).await?;

        let current = self.current_version().unwrap_or_default();
        let next_versions: Vec<u64> = layout
            .versions_after(current)
            .take_while(|version| *version <= checkpoint)
            .collect();

        for version in next_versions {
            let definition = self.read_definition(&layout, version).await?;
            if self.advance(definition).await? == ApplyOutcome::Finished {
                return Ok(ApplyOutcome::Finished);
            }
            self.merge_pending(&layout).await?;
        }

        Ok(ApplyOutcome::Pending)
    }

    /// Determines the version the target currently reflects.
    ///
    /// Consecutive versions with the same column names cannot be told apart from the target, so
    /// resumption starts at the oldest version of the newest such run. Its files are merged again
    /// and the DDL of the later versions is reapplied. Versions past `checkpoint` are ignored,
    /// except for the oldest version.
    async fn resume(
        &self,
        layout: &ChangeLayout,
        checkpoint: u64,
    ) -> EtlResult<Option<ApplierState>> {
        let Some(oldest) = layout.oldest_version() else {
            return Ok(None);
        };

        let target_columns: Vec<String> = target_column_names(&self.warehouse, &self.target)
            .await?
            .into_iter()
            .map(|name| name.to_lowercase())
            .collect();

        if target_columns.is_empty() {
            let definition = self.read_definition(layout, oldest).await?;
            let translation = self
                .translator
                .create_table(&self.target, &definition.columns)?;
            apply_statements(&self.warehouse, &translation.statements).await?;
            info!(table = %self.target, version = oldest, "created target table from the oldest definition");

            return Ok(Some(ApplierState::new(definition)));
        }

        let horizon = checkpoint.max(oldest);
        let mut candidates: Vec<(TableDefinition, bool)> = Vec::new();
        for version in layout.schemas.keys().copied().take_while(|version| *version <= horizon) {
            let mut definition = self.read_definition(layout, version).await?;
            if definition.action.is_structural()
                && definition.columns.is_empty()
                && let Some((previous, _)) = candidates.last()
            {
                definition.columns = previous.columns.clone();
            }

            let names: Vec<String> = definition
                .column_names()
                .map(|name| name.to_lowercase())
                .collect();
            let matches = !names.is_empty() && names == target_columns;
            candidates.push((definition, matches));
        }

        let Some(newest_match) = candidates.iter().rposition(|(_, matches)| *matches) else {
            warn!(
                table = %self.target,
                version = oldest,
                "target columns match no published definition, resuming from the oldest one"
            );
            return Ok(Some(ApplierState::new(self.read_definition(layout, oldest).await?)));
        };
        let start = candidates[..newest_match]
            .iter()
            .rposition(|(_, matches)| !*matches)
            .map_or(0, |index| index + 1);

        let Some((definition, _)) = candidates.into_iter().nth(start) else {
            bail!(ErrorKind::InvalidState, "Resumption version is out of range");
        };
        info!(table = %self.target, version = definition.version, "resuming change application");

        Ok(Some(ApplierState::new(definition)))
    }

    async fn read_definition(&self, layout: &ChangeLayout, version: u64) -> EtlResult<TableDefinition> {
        let Some(path) = layout.schemas.get(&version) else {
            bail!(
                ErrorKind::InvalidState,
                "Table definition is missing",
                format!("no schema file for version {version} of `{}`", self.table)
            );
        };

        let bytes = self.source.workspace().get(path).await?;
        let mut definition = parse_table_definition(&bytes)?;
        // Schema-level files carry the version in their path only.
        definition.version = version;
        // Statements address the target table, which may be named differently.
        definition.table = self.target.clone();

        Ok(definition)
    }

    /// Applies the schema change of `definition` and makes it the current version.
    async fn advance(&mut self, mut definition: TableDefinition) -> EtlResult<ApplyOutcome> {
        let Some(state) = self.state.as_mut() else {
            bail!(ErrorKind::InvalidState, "Change application is not initialized");
        };

        let translation = self
            .translator
            .translate(&state.definition.columns, &definition)?;
        apply_statements(&self.warehouse, &translation.statements).await?;

        info!(
            table = %self.target,
            from = state.version,
            to = definition.version,
            action = %definition.action,
            statements = translation.statements.len(),
            "applied schema change"
        );

        if definition.action.ends_replication() {
            return Ok(ApplyOutcome::Finished);
        }

        // Structural changes such as truncate keep the previous columns.
        if definition.action.is_structural() && definition.columns.is_empty() {
            definition.columns = state.definition.columns.clone();
        }
        *state = ApplierState::new(definition);

        Ok(ApplyOutcome::Pending)
    }

    /// Merges the files of the current version that were not merged yet.
    async fn merge_pending(&mut self, layout: &ChangeLayout) -> EtlResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        let pending: Vec<&String> = layout
            .files_of(state.version)
            .iter()
            .filter(|path| !state.applied.contains(*path))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let plan = MergePlan::new(&state.definition)?;
        for path in pending {
            let sql = plan.to_sql(self.stage.name(), self.source.stage_path(path));
            self.warehouse.execute(&sql).await?;
            etl_fail_point(INCREMENTAL_APPLY__AFTER_MERGE)?;

            info!(table = %self.target, file = %path, version = state.version, "merged change file");
            state.applied.insert(path.clone());
        }

        Ok(())
    }
}
