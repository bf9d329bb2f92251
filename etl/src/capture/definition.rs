//! Table definitions published by the capture service next to the change files.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{ColumnDescriptor, TableAction, TableDefinition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SchemaFile {
    table: String,
    schema: String,
    /// Version of the table, the commit timestamp of the DDL that produced the definition.
    #[serde(default)]
    table_version: u64,
    #[serde(default)]
    query: Option<String>,
    #[serde(default, rename = "Type")]
    action_type: u64,
    #[serde(default)]
    table_columns: Vec<SchemaColumn>,
}

#[derive(Debug, Deserialize)]
struct SchemaColumn {
    #[serde(rename = "ColumnId", default)]
    id: Option<String>,
    #[serde(rename = "ColumnName")]
    name: String,
    #[serde(rename = "ColumnType")]
    data_type: String,
    #[serde(rename = "ColumnPrecision", default)]
    precision: Option<String>,
    #[serde(rename = "ColumnScale", default)]
    scale: Option<String>,
    #[serde(rename = "ColumnNullable", default)]
    nullable: Option<String>,
    #[serde(rename = "ColumnIsPk", default)]
    is_pk: Option<String>,
    #[serde(rename = "ColumnDefault", default)]
    default: Option<Value>,
}

impl SchemaColumn {
    fn into_descriptor(self) -> EtlResult<ColumnDescriptor> {
        let nullable = self.nullable.as_deref() != Some("false");
        let primary_key = self.is_pk.as_deref() == Some("true");
        let mut column = ColumnDescriptor::new(self.name, self.data_type, nullable, primary_key);

        column.precision = parse_number(self.precision.as_deref())?;
        column.scale = parse_number(self.scale.as_deref())?;
        column.id = parse_number(self.id.as_deref())?;
        column.default = match self.default {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value),
            Some(other) => Some(other.to_string()),
        };

        Ok(column)
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>) -> EtlResult<Option<T>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            etl_error!(
                ErrorKind::DeserializationError,
                "Schema file holds an invalid number",
                format!("`{value}`")
            )
        }),
    }
}

/// Parses a schema file written by the capture service.
pub fn parse_table_definition(bytes: &[u8]) -> EtlResult<TableDefinition> {
    let file: SchemaFile = serde_json::from_slice(bytes)?;
    let columns = file
        .table_columns
        .into_iter()
        .map(SchemaColumn::into_descriptor)
        .collect::<EtlResult<Vec<_>>>()?;

    let mut definition = TableDefinition::new(file.schema, file.table, columns)
        .with_version(file.table_version)
        .with_action(TableAction::from_ddl_type(file.action_type));
    definition.query = file.query.filter(|query| !query.is_empty());

    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capture_schema_files() {
        let json = r#"{
            "Table": "orders",
            "Schema": "shop",
            "Version": 1,
            "TableVersion": 449000000000000005,
            "Query": "ALTER TABLE orders ADD COLUMN note VARCHAR(32) DEFAULT 'n/a'",
            "Type": 5,
            "TableColumns": [
                {"ColumnId": "1", "ColumnName": "id", "ColumnType": "BIGINT UNSIGNED", "ColumnNullable": "false", "ColumnIsPk": "true"},
                {"ColumnId": "2", "ColumnName": "amount", "ColumnType": "DECIMAL", "ColumnPrecision": "10", "ColumnScale": "2", "ColumnDefault": 0},
                {"ColumnId": "3", "ColumnName": "note", "ColumnType": "VARCHAR", "ColumnPrecision": "32", "ColumnDefault": "n/a"}
            ],
            "TableColumnsTotal": 3
        }"#;

        let definition = parse_table_definition(json.as_bytes()).unwrap();

        assert_eq!(definition.version, 449_000_000_000_000_005);
        assert_eq!(definition.action, TableAction::None);
        assert_eq!(
            definition.columns,
            vec![
                ColumnDescriptor::new("id", "bigint unsigned", false, true).with_id(1),
                ColumnDescriptor::new("amount", "decimal", true, false)
                    .with_precision(10)
                    .with_scale(2)
                    .with_default("0")
                    .with_id(2),
                ColumnDescriptor::new("note", "varchar", true, false)
                    .with_precision(32)
                    .with_default("n/a")
                    .with_id(3),
            ]
        );
    }

    #[test]
    fn structural_actions_come_from_the_type_code() {
        let json = r#"{"Table": "orders", "Schema": "shop", "TableVersion": 7, "Query": "TRUNCATE TABLE orders", "Type": 11}"#;

        let definition = parse_table_definition(json.as_bytes()).unwrap();

        assert_eq!(definition.action, TableAction::Truncate);
        assert!(definition.columns.is_empty());
    }

    #[test]
    fn invalid_precision_is_rejected() {
        let json = r#"{"Table": "t", "Schema": "s", "TableColumns": [{"ColumnName": "c", "ColumnType": "VARCHAR", "ColumnPrecision": "x"}]}"#;

        let err = parse_table_definition(json.as_bytes()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
