//! Merge statements that apply one staged change file to a target table.

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::sql::quote_identifier;
use crate::types::{
    CHANGE_FIRST_COLUMN_POSITION, CHANGE_FLAG_POSITION, CHANGE_ORDERING_POSITION, TableDefinition,
};

/// Column of a merge, with its 1-based position in a staged change file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeColumn {
    pub name: String,
    pub position: usize,
    pub primary_key: bool,
}

/// Resolved column lists of an idempotent three-way merge.
///
/// The staged rows are deduplicated by primary key, keeping the row with the highest ordering key,
/// and then matched against the target on primary key equality: matched rows are updated or
/// deleted, unmatched rows are inserted unless they are deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    table: String,
    columns: Vec<MergeColumn>,
}

impl MergePlan {
    /// Builds the plan for `table`, which must have at least one primary key column.
    pub fn new(table: &TableDefinition) -> EtlResult<MergePlan> {
        if table.primary_key_columns().next().is_none() {
            bail!(
                ErrorKind::MissingPrimaryKey,
                "Changes cannot be merged into a table without a primary key",
                format!(
                    "`{}` has no primary key column, rows cannot be deduplicated deterministically",
                    table.name()
                )
            );
        }

        let columns = table
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| MergeColumn {
                name: column.name.clone(),
                position: CHANGE_FIRST_COLUMN_POSITION + index,
                primary_key: column.primary_key,
            })
            .collect();

        Ok(Self {
            table: table.table.clone(),
            columns,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[MergeColumn] {
        &self.columns
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &MergeColumn> {
        self.columns.iter().filter(|column| column.primary_key)
    }

    pub fn update_columns(&self) -> impl Iterator<Item = &MergeColumn> {
        self.columns.iter().filter(|column| !column.primary_key)
    }

    /// 0-based indices of the key columns within a row's values.
    pub fn key_indices(&self) -> Vec<usize> {
        self.key_columns()
            .map(|column| column.position - CHANGE_FIRST_COLUMN_POSITION)
            .collect()
    }

    /// Renders the `MERGE` statement reading the change file at `path` inside `stage`.
    pub fn to_sql(&self, stage: &str, path: &str) -> String {
        let mut projection = vec![format!("${CHANGE_FLAG_POSITION} AS \"METADATA$FLAG\"")];
        projection.extend(
            self.columns
                .iter()
                .map(|column| format!("${} AS {}", column.position, quote_identifier(&column.name))),
        );

        let keys: Vec<_> = self
            .key_columns()
            .map(|column| quote_identifier(&column.name))
            .collect();
        let on: Vec<_> = keys.iter().map(|key| format!("T.{key} = S.{key}")).collect();
        let names: Vec<_> = self
            .columns
            .iter()
            .map(|column| quote_identifier(&column.name))
            .collect();
        let values: Vec<_> = names.iter().map(|name| format!("S.{name}")).collect();
        let updates: Vec<_> = self
            .update_columns()
            .map(|column| {
                let name = quote_identifier(&column.name);
                format!("{name} = S.{name}")
            })
            .collect();

        let mut sql = format!(
            "MERGE INTO {table} AS T USING (SELECT {projection} FROM '@{stage}/{path}' \
             QUALIFY row_number() OVER (PARTITION BY {keys} ORDER BY ${CHANGE_ORDERING_POSITION} DESC, METADATA$FILE_ROW_NUMBER DESC) = 1) AS S \
             ON ({on})",
            table = quote_identifier(&self.table),
            projection = projection.join(", "),
            stage = stage.replace('\'', "''"),
            path = path.replace('\'', "''"),
            keys = keys.join(", "),
            on = on.join(" AND "),
        );
        if !updates.is_empty() {
            sql.push_str(&format!(
                " WHEN MATCHED AND S.\"METADATA$FLAG\" != 'D' THEN UPDATE SET {}",
                updates.join(", ")
            ));
        }
        sql.push_str(&format!(
            " WHEN MATCHED AND S.\"METADATA$FLAG\" = 'D' THEN DELETE \
             WHEN NOT MATCHED AND S.\"METADATA$FLAG\" != 'D' THEN INSERT ({}) VALUES ({});",
            names.join(", "),
            values.join(", ")
        ));

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnDescriptor;

    fn orders() -> TableDefinition {
        TableDefinition::new(
            "shop",
            "orders",
            vec![
                ColumnDescriptor::new("id", "int", false, true),
                ColumnDescriptor::new("region", "varchar", false, true).with_precision(8),
                ColumnDescriptor::new("amount", "decimal", true, false),
            ],
        )
    }

    #[test]
    fn resolves_key_and_update_columns() {
        let plan = MergePlan::new(&orders()).unwrap();

        assert_eq!(plan.key_indices(), vec![0, 1]);
        assert_eq!(
            plan.update_columns()
                .map(|column| column.name.as_str())
                .collect::<Vec<_>>(),
            vec!["amount"]
        );
        assert_eq!(plan.columns()[2].position, 7);
    }

    #[test]
    fn renders_three_way_merge() {
        let sql = MergePlan::new(&orders())
            .unwrap()
            .to_sql("increment_stage_orders", "shop/orders/1/CDC000001.csv");

        assert_eq!(
            sql,
            "MERGE INTO orders AS T USING (SELECT $1 AS \"METADATA$FLAG\", $5 AS id, $6 AS region, $7 AS amount \
             FROM '@increment_stage_orders/shop/orders/1/CDC000001.csv' \
             QUALIFY row_number() OVER (PARTITION BY id, region ORDER BY $4 DESC, METADATA$FILE_ROW_NUMBER DESC) = 1) AS S \
             ON (T.id = S.id AND T.region = S.region) \
             WHEN MATCHED AND S.\"METADATA$FLAG\" != 'D' THEN UPDATE SET amount = S.amount \
             WHEN MATCHED AND S.\"METADATA$FLAG\" = 'D' THEN DELETE \
             WHEN NOT MATCHED AND S.\"METADATA$FLAG\" != 'D' THEN INSERT (id, region, amount) VALUES (S.id, S.region, S.amount);"
        );
    }

    #[test]
    fn key_only_tables_skip_the_update_clause() {
        let table = TableDefinition::new(
            "shop",
            "tags",
            vec![ColumnDescriptor::new("tag", "varchar", false, true)],
        );

        let sql = MergePlan::new(&table).unwrap().to_sql("s", "f.csv");

        assert!(!sql.contains("UPDATE SET"));
        assert!(sql.contains("THEN DELETE"));
    }

    #[test]
    fn tables_without_primary_key_are_rejected() {
        let table = TableDefinition::new(
            "shop",
            "events",
            vec![ColumnDescriptor::new("payload", "text", true, false)],
        );

        let err = MergePlan::new(&table).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingPrimaryKey);
        assert!(err.detail().unwrap().contains("shop.events"));
    }
}
