use std::sync::Arc;

use chrono::Utc;
use config::shared::ReplicatorConfig;
use tracing::info;
use uuid::Uuid;

use crate::capture::INCREMENT_PREFIX;
use crate::capture::client::{CaptureClient, CaptureRequest, TiCdcClient};
use crate::capture::sink::{build_sink_uri, changefeed_id};
use crate::concurrency::shutdown::{ShutdownRx, shutdown_requested};
use crate::destination::Warehouse;
use crate::destination::snowflake::SnowflakeClient;
use crate::destination::stage::StageCredentials;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::failpoints::{
    CAPTURE_REGISTRATION__AFTER_REGISTER, SNAPSHOT_LOAD__BEFORE_MARKER, etl_fail_point,
};
use crate::replication::incremental::{ChangeSource, IncrementalApplier};
use crate::schema::ddl::DdlTranslator;
use crate::schema::dialect::SqlDialect;
use crate::snapshot::SNAPSHOT_PREFIX;
use crate::snapshot::extractor::{DumplingExtractor, ExtractRequest, SnapshotExtractor};
use crate::snapshot::progress::ProgressCallback;
use crate::snapshot::stage::StageManager;
use crate::source::{Source, TidbSource};
use crate::state::markers::{LoadInfo, MarkerStore};
use crate::state::phase::PhasePlan;
use crate::storage::Workspace;
use crate::types::{ConsistencyPoint, TableName};

/// Identifier of one invocation of the replicator.
pub type SessionId = Uuid;

/// Connections and identifiers resolved for one invocation.
///
/// The session owns its connections. [`ReplicationSession::into_pipeline`] hands them to the
/// pipeline, which releases them in [`ReplicationPipeline::close`].
#[derive(Debug)]
pub struct ReplicationSession {
    id: SessionId,
    table: TableName,
    target: String,
    source: TidbSource,
    warehouse: SnowflakeClient,
    workspace: Workspace,
}

impl ReplicationSession {
    /// Resolves the tables of `config` and connects to every collaborator.
    ///
    /// The source and the warehouse are pinged, so unreachable endpoints fail here, before any
    /// side effect.
    pub async fn connect(config: &ReplicatorConfig) -> EtlResult<ReplicationSession> {
        let id = Uuid::new_v4();
        let table: TableName = config.table.parse().map_err(|err| {
            etl_error!(
                ErrorKind::InvalidIdentifier,
                "Invalid source table name",
                format!("{err}")
            )
        })?;
        let target = table.name.clone();

        info!(session_id = %id, table = %table, target = %target, "connecting replication session");

        let workspace = Workspace::open(&config.workspace)?;
        let source = TidbSource::connect(&config.source).await?;
        let warehouse = SnowflakeClient::new(&config.warehouse, config.timezone.clone())?;
        warehouse.execute("SELECT 1").await?;

        info!(session_id = %id, "replication session connected");

        Ok(Self {
            id,
            table,
            target,
            source,
            warehouse,
            workspace,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Builds the pipeline of `config` over the connections of this session.
    pub fn into_pipeline(
        self,
        config: Arc<ReplicatorConfig>,
    ) -> EtlResult<ReplicationPipeline<TidbSource, SnowflakeClient, TiCdcClient, DumplingExtractor>>
    {
        let capture = TiCdcClient::new(config.capture.api_url())?;
        let extractor =
            DumplingExtractor::new(&config.snapshot.extractor_path, config.source.clone());

        Ok(ReplicationPipeline {
            id: self.id,
            config,
            table: self.table,
            target: self.target,
            source: self.source,
            warehouse: self.warehouse,
            markers: MarkerStore::new(self.workspace.clone()),
            workspace: self.workspace,
            capture,
            extractor,
            translator: DdlTranslator::new(SqlDialect::Snowflake),
        })
    }
}

/// Drives one replication: snapshot bootstrap, capture registration and change application.
///
/// Which of these run is decided at the start of every run from the markers in the workspace, so
/// an interrupted replication resumes by running the same pipeline again.
#[derive(Debug)]
pub struct ReplicationPipeline<S, W, C, E> {
    id: SessionId,
    config: Arc<ReplicatorConfig>,
    table: TableName,
    target: String,
    source: S,
    warehouse: W,
    workspace: Workspace,
    markers: MarkerStore,
    capture: C,
    extractor: E,
    translator: DdlTranslator,
}

impl<S, W, C, E> ReplicationPipeline<S, W, C, E>
where
    S: Source + Send + Sync,
    W: Warehouse + Clone + Send + Sync + 'static,
    C: CaptureClient + Sync,
    E: SnapshotExtractor + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ReplicatorConfig>,
        table: TableName,
        target: impl Into<String>,
        source: S,
        warehouse: W,
        workspace: Workspace,
        capture: C,
        extractor: E,
    ) -> ReplicationPipeline<S, W, C, E> {
        Self {
            id: Uuid::new_v4(),
            config,
            table,
            target: target.into(),
            source,
            warehouse,
            markers: MarkerStore::new(workspace.clone()),
            workspace,
            capture,
            extractor,
            translator: DdlTranslator::new(SqlDialect::Snowflake),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs the phases the markers leave to do, then applies changes until `shutdown_rx` fires.
    pub async fn run(&self, shutdown_rx: ShutdownRx) -> EtlResult<()> {
        let markers = self.markers.read().await?;
        let plan = PhasePlan::new(
            self.config.mode,
            markers,
            self.config.capture.sink_uri.as_deref(),
        );

        info!(
            session_id = %self.id,
            table = %self.table,
            mode = %self.config.mode,
            phase = %plan.phase,
            run_snapshot = plan.run_snapshot,
            register_capture = plan.register_capture,
            "starting replication"
        );

        let mut load_info = None;
        if plan.run_snapshot {
            load_info = Some(self.run_snapshot().await?);
        } else if self.config.mode.includes_snapshot() {
            info!(table = %self.table, "snapshot already loaded, skipping bulk load");
        }

        if !plan.run_incremental {
            info!(session_id = %self.id, "snapshot-only replication finished");
            return Ok(());
        }

        if shutdown_requested(&shutdown_rx) {
            info!(session_id = %self.id, "shutdown requested before change application");
            return Ok(());
        }

        let change_source = match &plan.external_sink {
            Some(sink_uri) => self.attach_sink(sink_uri)?,
            None => {
                if plan.register_capture {
                    self.register_capture(load_info).await?;
                }
                ChangeSource::new(self.workspace.clone(), INCREMENT_PREFIX)
            }
        };

        let credentials = StageCredentials::resolve(
            &change_source.url(),
            self.config.warehouse.storage_integration.as_deref(),
        )?;
        let applier = IncrementalApplier::new(
            self.warehouse.clone(),
            change_source,
            self.table.clone(),
            &self.target,
            self.translator,
            credentials,
            self.config.capture.poll_interval(),
        );

        applier.run(shutdown_rx).await
    }

    /// Releases the connections held by the pipeline.
    pub async fn close(self) {
        self.source.close().await;
        info!(session_id = %self.id, "replication session closed");
    }

    async fn run_snapshot(&self) -> EtlResult<LoadInfo> {
        let credentials = StageCredentials::resolve(
            &self.workspace.url_for(SNAPSHOT_PREFIX),
            self.config.warehouse.storage_integration.as_deref(),
        )?;

        // The consistency point is taken before anything is extracted. Capture is later anchored
        // at the same point, so no change falls between the snapshot and the change stream.
        let consistency_point = self.source.current_consistency_point().await?;
        info!(table = %self.table, consistency_point, "starting snapshot");

        let columns = self
            .source
            .table_columns_at(&self.table, consistency_point)
            .await?;
        let create = self.translator.create_table(&self.target, &columns)?;
        for statement in &create.statements {
            self.warehouse.execute(statement).await?;
        }

        let request = ExtractRequest {
            table: self.table.clone(),
            consistency_point,
            output: self.workspace.url_for(SNAPSHOT_PREFIX),
            concurrency: self.config.snapshot.concurrency,
        };
        self.extractor.extract(&request).await?;

        let manager = StageManager::new(
            self.warehouse.clone(),
            self.workspace.clone(),
            self.table.clone(),
            &self.target,
            credentials,
        );

        let table = self.table.clone();
        let callback: ProgressCallback = Arc::new(move |rows_loaded| {
            info!(table = %table, rows_loaded, "snapshot load in progress");
        });
        let summary = manager.load(Some(callback)).await?;

        etl_fail_point(SNAPSHOT_LOAD__BEFORE_MARKER)?;

        let load_info = LoadInfo {
            consistency_point,
            parts: summary.parts,
            rows_loaded: summary.rows_loaded,
            loaded_at: Utc::now(),
        };
        self.markers.write_load_info(&load_info).await?;

        Ok(load_info)
    }

    async fn register_capture(&self, load_info: Option<LoadInfo>) -> EtlResult<()> {
        let load_info = match load_info {
            Some(load_info) => Some(load_info),
            None => self.markers.load_info().await?,
        };
        let start_ts: ConsistencyPoint = match load_info {
            Some(load_info) => load_info.consistency_point,
            None => self.source.current_consistency_point().await?,
        };

        let request = CaptureRequest {
            changefeed_id: changefeed_id(&self.table),
            sink_uri: build_sink_uri(&self.workspace.url_for(INCREMENT_PREFIX), &self.config.capture)?,
            start_ts,
            table: self.table.clone(),
        };
        let id = self.capture.register(&request).await?;

        info!(changefeed_id = %id, start_ts, table = %self.table, "registered capture job");

        etl_fail_point(CAPTURE_REGISTRATION__AFTER_REGISTER)?;

        Ok(())
    }

    /// Resolves where the change files of an externally created capture job live.
    ///
    /// Sinks inside the workspace reuse its store. Other sinks are opened on their own.
    fn attach_sink(&self, sink_uri: &str) -> EtlResult<ChangeSource> {
        let location = sink_uri
            .split_once('?')
            .map_or(sink_uri, |(location, _)| location)
            .trim_end_matches('/');

        let change_source = match location.strip_prefix(self.workspace.url()) {
            Some(relative) if relative.is_empty() || relative.starts_with('/') => {
                ChangeSource::new(self.workspace.clone(), relative)
            }
            _ => ChangeSource::new(Workspace::open(location)?, ""),
        };

        info!(sink = %location, "attached to external capture sink");

        Ok(change_source)
    }
}
