use std::sync::Arc;

use config::shared::ReplicationMode;
use etl::concurrency::shutdown::create_shutdown_channel;
use etl::error::ErrorKind;
use etl::state::markers::{CAPTURE_METADATA_PATH, LOAD_INFO_PATH, MarkerStore, Markers};
use etl::test_utils::capture::{publish_changes, publish_definition, write_checkpoint};
use etl::test_utils::extractor::MemorySnapshotExtractor;
use etl::test_utils::pipeline::{
    FIRST_CONSISTENCY_POINT, TestReplication, orders_columns, test_config, wait_until,
};
use etl::types::{ChangeFlag, ChangeRow, TableDefinition};
use telemetry::tracing::init_test_tracing;

#[tokio::test]
async fn snapshot_only_run_loads_every_part_and_writes_the_marker() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::SnapshotOnly)).await;

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    replication.pipeline().run(shutdown_rx).await.unwrap();

    let statements = replication.warehouse.statements().await;
    let create = statements
        .iter()
        .position(|s| s.starts_with("CREATE OR REPLACE TABLE orders ("))
        .unwrap();
    let first_copy = statements
        .iter()
        .position(|s| s.starts_with("COPY INTO orders"))
        .unwrap();
    assert!(create < first_copy);
    assert_eq!(replication.warehouse.statements_containing("COPY INTO").await.len(), 2);
    assert_eq!(
        statements.last().unwrap(),
        "DROP STAGE IF EXISTS snapshot_stage_orders;"
    );

    let load_info = MarkerStore::new(replication.workspace.clone())
        .load_info()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(load_info.consistency_point, FIRST_CONSISTENCY_POINT);
    assert_eq!(load_info.parts, 2);
    assert_eq!(load_info.rows_loaded, 2);

    let requests = replication.extractor.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].consistency_point, FIRST_CONSISTENCY_POINT);
    assert_eq!(requests[0].output, "memory:///snapshot");
    assert!(replication.capture.requests().await.is_empty());
}

#[tokio::test]
async fn missing_parts_fail_without_any_bulk_load() {
    init_test_tracing();
    let mut replication = TestReplication::new(test_config(ReplicationMode::Full)).await;
    replication.extractor = MemorySnapshotExtractor::new(replication.workspace.clone(), vec![]);

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let err = replication.pipeline().run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoSnapshotFiles);
    assert!(err.to_string().contains("No files found to load"));
    assert!(replication.warehouse.statements_containing("COPY INTO").await.is_empty());
    assert!(replication.warehouse.statements_containing("CREATE OR REPLACE STAGE").await.is_empty());
    assert!(!replication.workspace.exists(LOAD_INFO_PATH).await.unwrap());
    assert!(replication.capture.requests().await.is_empty());
}

#[tokio::test]
async fn failed_extraction_leaves_the_markers_untouched() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::Full)).await;
    replication.extractor.fail().await;

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let err = replication.pipeline().run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SnapshotExtractionFailed);
    assert_eq!(
        MarkerStore::new(replication.workspace.clone()).read().await.unwrap(),
        Markers::default()
    );
}

#[tokio::test]
async fn rerun_after_the_load_resumes_at_capture_registration() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::SnapshotOnly)).await;

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    replication.pipeline().run(shutdown_rx).await.unwrap();
    replication.warehouse.clear_statements().await;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pipeline = replication.pipeline_with(Arc::new(test_config(ReplicationMode::Full)));
    let handle = tokio::spawn(async move { pipeline.run(shutdown_rx).await });

    wait_until(|| async { !replication.capture.requests().await.is_empty() }).await;
    wait_until(|| async {
        !replication
            .warehouse
            .statements_containing("increment_stage_orders")
            .await
            .is_empty()
    })
    .await;
    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    assert!(replication.warehouse.statements_containing("COPY INTO").await.is_empty());
    assert!(replication.warehouse.statements_containing("CREATE OR REPLACE TABLE").await.is_empty());

    let requests = replication.capture.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].start_ts, FIRST_CONSISTENCY_POINT);
    assert_eq!(requests[0].changefeed_id, "replicate-shop-orders");
    assert!(requests[0].sink_uri.starts_with("memory:///increment?"));
    assert!(replication.workspace.exists(CAPTURE_METADATA_PATH).await.unwrap());
    assert_eq!(
        replication.warehouse.statements().await.last().unwrap(),
        "DROP STAGE IF EXISTS increment_stage_orders;"
    );
}

#[tokio::test]
async fn completed_phases_are_not_repeated() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::Full)).await;

    for run in 1..=2 {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let pipeline = replication.pipeline();
        let handle = tokio::spawn(async move { pipeline.run(shutdown_rx).await });
        wait_until(|| async {
            replication
                .warehouse
                .statements_containing("STAGE increment_stage_orders")
                .await
                .len()
                == run
        })
        .await;
        shutdown_tx.shutdown().unwrap();
        handle.await.unwrap().unwrap();
    }

    assert_eq!(replication.warehouse.statements_containing("COPY INTO").await.len(), 2);
    assert_eq!(replication.capture.requests().await.len(), 1);
    assert_eq!(replication.extractor.requests().await.len(), 1);
}

#[tokio::test]
async fn incremental_only_run_without_a_snapshot_starts_capture_now() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::IncrementalOnly)).await;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pipeline = replication.pipeline();
    let handle = tokio::spawn(async move { pipeline.run(shutdown_rx).await });
    wait_until(|| async { !replication.capture.requests().await.is_empty() }).await;
    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    assert!(replication.extractor.requests().await.is_empty());
    assert_eq!(
        replication.source.issued_points().await,
        vec![FIRST_CONSISTENCY_POINT]
    );
    assert_eq!(
        replication.capture.requests().await[0].start_ts,
        FIRST_CONSISTENCY_POINT
    );
}

#[tokio::test]
async fn external_sinks_are_attached_without_registration() {
    init_test_tracing();
    let mut config = test_config(ReplicationMode::IncrementalOnly);
    config.capture.sink_uri = Some("memory:///feed?protocol=csv".to_owned());
    let replication = TestReplication::new(config).await;

    let definition = TableDefinition::new("shop", "orders", orders_columns()).with_version(100);
    publish_definition(&replication.workspace, "feed", &definition, 0)
        .await
        .unwrap();
    publish_changes(
        &replication.workspace,
        "feed",
        &definition,
        1,
        &[ChangeRow::new(
            ChangeFlag::Insert,
            101,
            vec![Some("1".to_owned()), Some("a".to_owned())],
        )],
    )
    .await
    .unwrap();
    write_checkpoint(&replication.workspace, "feed/metadata", 101)
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pipeline = replication.pipeline();
    let handle = tokio::spawn(async move { pipeline.run(shutdown_rx).await });
    wait_until(|| async {
        !replication
            .warehouse
            .statements_containing("MERGE INTO orders")
            .await
            .is_empty()
    })
    .await;
    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    assert!(replication.capture.requests().await.is_empty());
    let stage = replication
        .warehouse
        .statements_containing("CREATE OR REPLACE STAGE")
        .await;
    assert!(stage.iter().any(|s| s.contains("increment_stage_orders")));
    let merges = replication.warehouse.statements_containing("MERGE INTO").await;
    assert!(merges[0].contains("'@increment_stage_orders/shop/orders/100/CDC000001.csv'"));
}
