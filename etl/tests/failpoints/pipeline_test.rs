use config::shared::ReplicationMode;
use etl::capture::INCREMENT_PREFIX;
use etl::concurrency::shutdown::create_shutdown_channel;
use etl::error::ErrorKind;
use etl::failpoints::{
    CAPTURE_REGISTRATION__AFTER_REGISTER, INCREMENTAL_APPLY__AFTER_MERGE,
    SNAPSHOT_LOAD__BEFORE_MARKER,
};
use etl::state::markers::{CAPTURE_METADATA_PATH, LOAD_INFO_PATH, MarkerStore};
use etl::test_utils::capture::{publish_changes, publish_definition};
use etl::test_utils::failpoints::FailpointScenario;
use etl::test_utils::pipeline::{TestReplication, orders_columns, test_config, wait_until};
use etl::types::{ChangeFlag, ChangeRow, TableDefinition};
use telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_load_is_repeated_on_the_next_run() {
    init_test_tracing();
    let scenario = FailpointScenario::setup(&[(SNAPSHOT_LOAD__BEFORE_MARKER, "return")]);
    let replication = TestReplication::new(test_config(ReplicationMode::SnapshotOnly)).await;

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let err = replication.pipeline().run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert_eq!(replication.warehouse.statements_containing("COPY INTO").await.len(), 2);
    assert!(!replication.workspace.exists(LOAD_INFO_PATH).await.unwrap());

    scenario.disable_all();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    replication.pipeline().run(shutdown_rx).await.unwrap();

    // Every part is loaded again: the first attempt left no marker behind.
    assert_eq!(replication.warehouse.statements_containing("COPY INTO").await.len(), 4);
    assert_eq!(replication.extractor.requests().await.len(), 2);
    let load_info = MarkerStore::new(replication.workspace.clone())
        .load_info()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(load_info.parts, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn registered_capture_is_not_registered_again() {
    init_test_tracing();
    let scenario = FailpointScenario::setup(&[(CAPTURE_REGISTRATION__AFTER_REGISTER, "return")]);
    let replication = TestReplication::new(test_config(ReplicationMode::Full)).await;

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let err = replication.pipeline().run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert_eq!(replication.capture.requests().await.len(), 1);
    assert!(replication.workspace.exists(CAPTURE_METADATA_PATH).await.unwrap());

    scenario.disable_all();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pipeline = replication.pipeline();
    let handle = tokio::spawn(async move { pipeline.run(shutdown_rx).await });
    wait_until(|| async {
        !replication
            .warehouse
            .statements_containing("STAGE increment_stage_orders")
            .await
            .is_empty()
    })
    .await;
    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(replication.capture.requests().await.len(), 1);
    assert_eq!(replication.warehouse.statements_containing("COPY INTO").await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn change_files_merged_before_a_crash_are_merged_again() {
    init_test_tracing();
    let scenario = FailpointScenario::setup(&[(INCREMENTAL_APPLY__AFTER_MERGE, "return")]);
    let replication = TestReplication::new(test_config(ReplicationMode::IncrementalOnly)).await;

    let definition = TableDefinition::new("shop", "orders", orders_columns()).with_version(100);
    publish_definition(&replication.workspace, INCREMENT_PREFIX, &definition, 0)
        .await
        .unwrap();
    publish_changes(
        &replication.workspace,
        INCREMENT_PREFIX,
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

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let err = replication.pipeline().run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert_eq!(replication.warehouse.statements_containing("MERGE INTO").await.len(), 1);

    scenario.disable_all();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pipeline = replication.pipeline();
    let handle = tokio::spawn(async move { pipeline.run(shutdown_rx).await });
    wait_until(|| async {
        replication.warehouse.statements_containing("MERGE INTO").await.len() == 2
    })
    .await;
    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    let merges = replication.warehouse.statements_containing("MERGE INTO").await;
    assert_eq!(merges[0], merges[1]);
    assert_eq!(replication.capture.requests().await.len(), 1);
}
