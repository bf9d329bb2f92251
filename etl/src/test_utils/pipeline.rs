use std::sync::Arc;
use std::time::Duration;

use config::shared::{
    CaptureConfig, ReplicationMode, ReplicatorConfig, SnapshotConfig, SnowflakeConfig,
    TidbConnectionConfig,
};

use crate::destination::QueryResult;
use crate::destination::memory::MemoryWarehouse;
use crate::pipeline::ReplicationPipeline;
use crate::snapshot::stage::SERVER_TIMESTAMP_QUERY;
use crate::storage::Workspace;
use crate::test_utils::capture::MemoryCaptureClient;
use crate::test_utils::extractor::MemorySnapshotExtractor;
use crate::test_utils::source::MemorySource;
use crate::types::{ColumnDescriptor, ConsistencyPoint, TableName};

pub type MemoryPipeline =
    ReplicationPipeline<MemorySource, MemoryWarehouse, MemoryCaptureClient, MemorySnapshotExtractor>;

/// First consistency point handed out by the source of a [`TestReplication`].
pub const FIRST_CONSISTENCY_POINT: ConsistencyPoint = 449_000_000_000_000_000;

/// Returns a valid configuration replicating `shop.orders` into an in-memory workspace.
pub fn test_config(mode: ReplicationMode) -> ReplicatorConfig {
    ReplicatorConfig {
        mode,
        table: "shop.orders".to_owned(),
        workspace: "memory:///".to_owned(),
        source: TidbConnectionConfig::default(),
        warehouse: SnowflakeConfig {
            account_id: "org-test".to_owned(),
            warehouse: "COMPUTE_WH".to_owned(),
            database: "ANALYTICS".to_owned(),
            schema: "PUBLIC".to_owned(),
            user: "loader".to_owned(),
            role: None,
            token: "token".into(),
            endpoint: None,
            storage_integration: None,
        },
        capture: CaptureConfig {
            flush_interval_ms: 50,
            ..CaptureConfig::default()
        },
        snapshot: SnapshotConfig::default(),
        timezone: None,
    }
}

/// Columns of `shop.orders` as returned by the test source.
pub fn orders_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id", "bigint", false, true).with_id(1),
        ColumnDescriptor::new("name", "varchar", true, false)
            .with_precision(32)
            .with_id(2),
    ]
}

/// Result of a `COPY INTO` that loaded `rows_loaded` rows of `file`, as named by the warehouse.
pub fn copy_result(file: &str, rows_loaded: u64) -> QueryResult {
    QueryResult::new(
        ["file", "status", "rows_parsed", "rows_loaded", "errors_seen", "first_error"]
            .map(str::to_owned)
            .to_vec(),
        vec![vec![
            Some(file.to_owned()),
            Some("LOADED".to_owned()),
            Some(rows_loaded.to_string()),
            Some(rows_loaded.to_string()),
            Some("0".to_owned()),
            None,
        ]],
    )
}

/// In-memory collaborators of one replication, shared by the pipelines built from it.
///
/// Pipelines built by the same [`TestReplication`] see the same workspace and warehouse, like
/// consecutive runs of the replicator against the same job.
#[derive(Debug, Clone)]
pub struct TestReplication {
    pub config: Arc<ReplicatorConfig>,
    pub workspace: Workspace,
    pub source: MemorySource,
    pub warehouse: MemoryWarehouse,
    pub capture: MemoryCaptureClient,
    pub extractor: MemorySnapshotExtractor,
}

impl TestReplication {
    /// A replication whose snapshot holds two parts of one row each.
    pub async fn new(config: ReplicatorConfig) -> TestReplication {
        let workspace = Workspace::in_memory();
        let warehouse = MemoryWarehouse::new();
        warehouse
            .respond(
                SERVER_TIMESTAMP_QUERY,
                QueryResult::new(
                    vec!["TS".to_owned()],
                    vec![vec![Some("2026-01-01T00:00:00.000000000+00:00".to_owned())]],
                ),
            )
            .await;
        for part in ["shop.orders.000000000.csv", "shop.orders.000000001.csv"] {
            warehouse
                .respond(part, copy_result(&format!("snapshot_stage_orders/{part}"), 1))
                .await;
        }

        Self {
            config: Arc::new(config),
            source: MemorySource::new(FIRST_CONSISTENCY_POINT, orders_columns()),
            capture: MemoryCaptureClient::new(workspace.clone()),
            extractor: MemorySnapshotExtractor::new(
                workspace.clone(),
                vec!["\"1\",\"a\"\n".to_owned(), "\"2\",\"b\"\n".to_owned()],
            ),
            warehouse,
            workspace,
        }
    }

    /// Builds a pipeline over the shared collaborators, like a fresh process would.
    pub fn pipeline(&self) -> MemoryPipeline {
        self.pipeline_with(self.config.clone())
    }

    /// Builds a pipeline over the shared collaborators with another configuration.
    pub fn pipeline_with(&self, config: Arc<ReplicatorConfig>) -> MemoryPipeline {
        ReplicationPipeline::new(
            config,
            TableName::new("shop", "orders"),
            "orders",
            self.source.clone(),
            self.warehouse.clone(),
            self.workspace.clone(),
            self.capture.clone(),
            self.extractor.clone(),
        )
    }
}

/// Polls `condition` every few milliseconds until it holds, panicking after five seconds.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within five seconds"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
