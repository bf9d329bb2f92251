use std::collections::BTreeMap;

use etl::error::ErrorKind;
use etl::replication::merge::MergePlan;
use etl::test_utils::materialize::MaterializedTable;
use etl::types::{ChangeFlag, ChangeRow, ColumnDescriptor, TableDefinition};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn accounts() -> TableDefinition {
    TableDefinition::new(
        "bank",
        "accounts",
        vec![
            ColumnDescriptor::new("id", "int", false, true),
            ColumnDescriptor::new("name", "varchar", true, false).with_precision(10),
        ],
    )
}

fn row(flag: ChangeFlag, ordering_key: u64, id: u32, name: Option<&str>) -> ChangeRow {
    ChangeRow::new(
        flag,
        ordering_key,
        vec![Some(id.to_string()), name.map(str::to_owned)],
    )
}

fn key(id: u32) -> Vec<Option<String>> {
    vec![Some(id.to_string())]
}

#[test]
fn latest_delete_wins_over_earlier_updates() {
    let plan = MergePlan::new(&accounts()).unwrap();
    let mut table = MaterializedTable::new(&plan);
    table.merge(&[row(ChangeFlag::Insert, 0, 5, Some("x"))]);

    let changed = table.merge(&[
        row(ChangeFlag::Update, 1, 5, Some("a")),
        row(ChangeFlag::Update, 2, 5, Some("b")),
        row(ChangeFlag::Delete, 3, 5, None),
    ]);

    assert_eq!(changed, 1);
    assert_eq!(table.get(&key(5)), None);
}

#[test]
fn deletes_of_missing_rows_insert_nothing() {
    let plan = MergePlan::new(&accounts()).unwrap();
    let mut table = MaterializedTable::new(&plan);

    table.merge(&[
        row(ChangeFlag::Update, 1, 5, Some("a")),
        row(ChangeFlag::Delete, 3, 5, None),
    ]);

    assert!(table.is_empty());
}

#[test]
fn merging_twice_changes_nothing_the_second_time() {
    let plan = MergePlan::new(&accounts()).unwrap();
    let mut table = MaterializedTable::new(&plan);
    let batch = [
        row(ChangeFlag::Insert, 1, 1, Some("a")),
        row(ChangeFlag::Insert, 2, 2, Some("b")),
        row(ChangeFlag::Update, 3, 1, Some("c")),
        row(ChangeFlag::Delete, 4, 2, None),
    ];

    let first = table.merge(&batch);
    let converged = table.clone();
    let second = table.merge(&batch);

    assert_eq!(first, 1);
    assert_eq!(second, 0);
    assert_eq!(table, converged);
}

#[test]
fn merges_converge_to_row_by_row_application() {
    let plan = MergePlan::new(&accounts()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..500 {
        let mut merged = MaterializedTable::new(&plan);
        let mut sequential = MaterializedTable::new(&plan);

        // Both tables start from the same random state.
        let initial: Vec<ChangeRow> = (0..rng.gen_range(0..6))
            .map(|id| row(ChangeFlag::Insert, 0, id, Some("initial")))
            .collect();
        merged.merge(&initial);
        sequential.apply_in_order(&initial);

        let mut ordering_key = 1;
        let batch: Vec<ChangeRow> = (0..rng.gen_range(1..20))
            .map(|_| {
                let id = rng.gen_range(0..6);
                // Ordering keys are unique per row and shuffled within the file.
                ordering_key += rng.gen_range(1..3);
                match rng.gen_range(0..3) {
                    0 => row(ChangeFlag::Insert, ordering_key, id, Some("inserted")),
                    1 => row(ChangeFlag::Update, ordering_key, id, Some(&format!("v{ordering_key}"))),
                    _ => row(ChangeFlag::Delete, ordering_key, id, None),
                }
            })
            .collect();
        let mut shuffled = batch.clone();
        for index in (1..shuffled.len()).rev() {
            shuffled.swap(index, rng.gen_range(0..=index));
        }

        merged.merge(&shuffled);
        sequential.apply_in_order(&batch);

        assert_eq!(merged.rows(), sequential.rows(), "batch: {batch:?}");
    }
}

#[test]
fn merge_statements_target_one_staged_file() {
    let sql = MergePlan::new(&accounts())
        .unwrap()
        .to_sql("increment_stage_accounts", "bank/accounts/100/CDC000001.csv");

    assert!(sql.starts_with("MERGE INTO accounts AS T USING (SELECT $1 AS \"METADATA$FLAG\", $5 AS id, $6 AS name FROM '@increment_stage_accounts/bank/accounts/100/CDC000001.csv'"));
    assert!(sql.contains("ON (T.id = S.id)"));
    assert!(sql.contains("WHEN MATCHED AND S.\"METADATA$FLAG\" = 'D' THEN DELETE"));
}

#[test]
fn tables_without_primary_key_are_rejected() {
    let mut definition = accounts();
    for column in &mut definition.columns {
        column.primary_key = false;
    }

    let err = MergePlan::new(&definition).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingPrimaryKey);
    assert!(err.to_string().contains("bank.accounts"));
}

#[test]
fn composite_keys_deduplicate_per_tuple() {
    let definition = TableDefinition::new(
        "bank",
        "entries",
        vec![
            ColumnDescriptor::new("account", "int", false, true),
            ColumnDescriptor::new("day", "date", false, true),
            ColumnDescriptor::new("amount", "decimal", true, false),
        ],
    );
    let plan = MergePlan::new(&definition).unwrap();
    let mut table = MaterializedTable::new(&plan);
    let entry = |ordering_key: u64, account: &str, amount: &str| {
        ChangeRow::new(
            ChangeFlag::Update,
            ordering_key,
            vec![
                Some(account.to_owned()),
                Some("2026-01-01".to_owned()),
                Some(amount.to_owned()),
            ],
        )
    };

    table.merge(&[entry(1, "1", "10"), entry(2, "2", "20"), entry(3, "1", "30")]);

    let amounts: BTreeMap<_, _> = table
        .rows()
        .iter()
        .map(|(key, values)| (key[0].clone(), values[2].clone()))
        .collect();
    assert_eq!(
        amounts,
        BTreeMap::from([
            (Some("1".to_owned()), Some("30".to_owned())),
            (Some("2".to_owned()), Some("20".to_owned())),
        ])
    );
}
