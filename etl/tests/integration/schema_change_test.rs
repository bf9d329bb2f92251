use config::shared::ReplicationMode;
use etl::capture::INCREMENT_PREFIX;
use etl::concurrency::shutdown::create_shutdown_channel;
use etl::error::ErrorKind;
use etl::test_utils::capture::{publish_changes, publish_definition};
use etl::test_utils::pipeline::{TestReplication, test_config, wait_until};
use etl::types::{ChangeFlag, ChangeRow, ColumnDescriptor, TableDefinition};
use telemetry::tracing::init_test_tracing;

fn id() -> ColumnDescriptor {
    ColumnDescriptor::new("id", "bigint", false, true).with_id(1)
}

fn varchar(name: &str, id: i64, nullable: bool) -> ColumnDescriptor {
    ColumnDescriptor::new(name, "varchar", nullable, false)
        .with_precision(32)
        .with_id(id)
}

fn age() -> ColumnDescriptor {
    ColumnDescriptor::new("age", "int", true, false).with_id(3)
}

fn version(version: u64, columns: Vec<ColumnDescriptor>) -> TableDefinition {
    TableDefinition::new("shop", "orders", columns).with_version(version)
}

async fn publish(replication: &TestReplication, definition: &TableDefinition, action_type: u64) {
    publish_definition(&replication.workspace, INCREMENT_PREFIX, definition, action_type)
        .await
        .unwrap();
}

#[tokio::test]
async fn column_changes_are_applied_in_version_order() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::IncrementalOnly)).await;

    publish(&replication, &version(100, vec![id(), varchar("name", 2, true)]), 0).await;
    publish(&replication, &version(200, vec![id(), varchar("name", 2, true), age()]), 0).await;
    publish(&replication, &version(300, vec![id(), varchar("title", 2, true), age()]), 0).await;
    publish(&replication, &version(400, vec![id(), varchar("title", 2, true)]), 0).await;
    publish(&replication, &version(500, vec![id(), varchar("title", 2, false)]), 0).await;
    // Structural changes are published without columns.
    publish(&replication, &version(600, vec![]), 11).await;
    let latest = version(
        700,
        vec![id(), varchar("title", 2, false), varchar("note", 4, true)],
    );
    publish(&replication, &latest, 0).await;
    let file = publish_changes(
        &replication.workspace,
        INCREMENT_PREFIX,
        &latest,
        1,
        &[ChangeRow::new(
            ChangeFlag::Insert,
            701,
            vec![Some("1".to_owned()), Some("t".to_owned()), None],
        )],
    )
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

    let ddl: Vec<String> = replication
        .warehouse
        .statements()
        .await
        .into_iter()
        .filter(|s| s.starts_with("ALTER TABLE") || s.starts_with("TRUNCATE"))
        .collect();
    assert_eq!(
        ddl,
        vec![
            "ALTER TABLE orders ADD COLUMN age INT DEFAULT NULL;",
            "ALTER TABLE orders RENAME COLUMN name TO title;",
            "ALTER TABLE orders DROP COLUMN age;",
            "ALTER TABLE orders MODIFY COLUMN title SET NOT NULL;",
            "TRUNCATE TABLE orders;",
            "ALTER TABLE orders ADD COLUMN note VARCHAR(32) DEFAULT NULL;",
        ]
    );

    let statements = replication.warehouse.statements().await;
    let create = statements
        .iter()
        .position(|s| s.starts_with("CREATE OR REPLACE TABLE orders ("))
        .unwrap();
    let add_note = statements
        .iter()
        .position(|s| s.contains("ADD COLUMN note"))
        .unwrap();
    let merge = statements
        .iter()
        .position(|s| s.starts_with("MERGE INTO orders"))
        .unwrap();
    assert!(create < add_note && add_note < merge);
    assert!(statements[merge].contains(file.trim_start_matches("increment/")));
}

#[tokio::test]
async fn unsupported_structural_changes_stop_the_replication() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::IncrementalOnly)).await;

    publish(&replication, &version(100, vec![id(), varchar("name", 2, true)]), 0).await;
    publish(&replication, &version(200, vec![]), 3).await;

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let err = replication.pipeline().run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedDdl);
    assert!(err.to_string().contains("create-table"));
    assert_eq!(
        replication.warehouse.statements().await.last().unwrap(),
        "DROP STAGE IF EXISTS increment_stage_orders;"
    );
}

#[tokio::test]
async fn dropping_the_table_ends_the_replication() {
    init_test_tracing();
    let replication = TestReplication::new(test_config(ReplicationMode::IncrementalOnly)).await;

    publish(&replication, &version(100, vec![id(), varchar("name", 2, true)]), 0).await;
    publish(&replication, &version(200, vec![]), 4).await;

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    replication.pipeline().run(shutdown_rx).await.unwrap();

    assert_eq!(
        replication.warehouse.statements_containing("DROP TABLE").await,
        vec!["DROP TABLE orders;"]
    );
}
