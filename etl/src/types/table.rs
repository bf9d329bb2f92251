use std::fmt;

use tidb::types::{ColumnDescriptor, TableName};

/// Structural action attached to a schema change.
///
/// Structural actions and column level changes are mutually exclusive: a definition tagged with
/// anything but [`TableAction::None`] never produces column DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableAction {
    #[default]
    None,
    Truncate,
    DropTable,
    CreateTable,
    RenameTables,
    DropSchema,
    CreateSchema,
}

impl TableAction {
    /// Maps a TiDB DDL job type code to the action it represents.
    ///
    /// Codes that do not change the table as a whole (column changes, index changes, ...) map to
    /// [`TableAction::None`].
    pub fn from_ddl_type(code: u64) -> TableAction {
        match code {
            1 => TableAction::CreateSchema,
            2 => TableAction::DropSchema,
            3 => TableAction::CreateTable,
            4 => TableAction::DropTable,
            11 => TableAction::Truncate,
            14 | 56 => TableAction::RenameTables,
            _ => TableAction::None,
        }
    }

    pub fn is_structural(&self) -> bool {
        !matches!(self, TableAction::None)
    }

    /// Returns `true` when the table no longer exists after the action.
    pub fn ends_replication(&self) -> bool {
        matches!(self, TableAction::DropTable | TableAction::DropSchema)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableAction::None => "none",
            TableAction::Truncate => "truncate",
            TableAction::DropTable => "drop-table",
            TableAction::CreateTable => "create-table",
            TableAction::RenameTables => "rename-tables",
            TableAction::DropSchema => "drop-schema",
            TableAction::CreateSchema => "create-schema",
        }
    }
}

impl fmt::Display for TableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version of a table's definition as published by the schema-change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub schema: String,
    pub table: String,
    /// Table version, the commit timestamp of the DDL that produced this definition.
    pub version: u64,
    /// DDL statement that produced this definition, if any.
    pub query: Option<String>,
    pub action: TableAction,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDefinition {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
    ) -> TableDefinition {
        Self {
            schema: schema.into(),
            table: table.into(),
            version: 0,
            query: None,
            action: TableAction::None,
            columns,
        }
    }

    pub fn with_action(mut self, action: TableAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn name(&self) -> TableName {
        TableName::new(&self.schema, &self.table)
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|column| column.primary_key)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}
