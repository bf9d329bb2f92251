//! Translation of source schema changes into target DDL.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::schema::dialect::SqlDialect;
use crate::schema::diff::{ColumnDiffEntry, DiffAction, compute_column_diff};
use crate::schema::sql::{quote_identifier, render_literal};
use crate::types::{ColumnDescriptor, TableAction, TableDefinition};

/// A degraded translation: the statement was emitted with the named column or clause left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationWarning {
    /// The source type has no target mapping.
    UnknownSourceType { column: String, data_type: String },
    /// The target cannot change a default to a new value in place.
    UnsupportedDefaultChange {
        column: String,
        before: Option<String>,
        after: String,
    },
}

impl fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationWarning::UnknownSourceType { column, data_type } => write!(
                f,
                "column `{column}` has source type `{data_type}` which has no target mapping, the column is omitted"
            ),
            TranslationWarning::UnsupportedDefaultChange {
                column,
                before,
                after,
            } => write!(
                f,
                "default of column `{column}` changed from {} to `{after}` which cannot be altered in place, the change is omitted",
                before.as_deref().map_or("none".to_owned(), |b| format!("`{b}`"))
            ),
        }
    }
}

/// Statements produced for one schema change, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DdlTranslation {
    pub statements: Vec<String>,
    pub warnings: Vec<TranslationWarning>,
}

impl DdlTranslation {
    fn statement(statement: String) -> DdlTranslation {
        Self {
            statements: vec![statement],
            warnings: vec![],
        }
    }

    fn warn(&mut self, warning: TranslationWarning) {
        warn!(%warning, "degraded schema translation");
        self.warnings.push(warning);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ModifyClause {
    DataType(String),
    DropDefault,
    SetNotNull,
    DropNotNull,
}

/// Translates table definitions into DDL for one [`SqlDialect`].
#[derive(Debug, Clone, Copy)]
pub struct DdlTranslator {
    dialect: SqlDialect,
}

impl DdlTranslator {
    pub fn new(dialect: SqlDialect) -> DdlTranslator {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Returns the statements that bring a table with `previous` columns to `current`.
    ///
    /// Structural actions map to a single statement and never produce column DDL. Creating or
    /// renaming a table, and creating a schema, are rejected with [`ErrorKind::UnsupportedDdl`].
    pub fn translate(
        &self,
        previous: &[ColumnDescriptor],
        current: &TableDefinition,
    ) -> EtlResult<DdlTranslation> {
        let table = quote_identifier(&current.table);

        match current.action {
            TableAction::None => {}
            TableAction::Truncate => {
                return Ok(DdlTranslation::statement(format!("TRUNCATE TABLE {table};")));
            }
            TableAction::DropTable => {
                return Ok(DdlTranslation::statement(format!("DROP TABLE {table};")));
            }
            TableAction::DropSchema => {
                return Ok(DdlTranslation::statement(format!(
                    "DROP SCHEMA {} CASCADE;",
                    quote_identifier(&current.schema)
                )));
            }
            action @ (TableAction::CreateTable
            | TableAction::RenameTables
            | TableAction::CreateSchema) => {
                return Err(etl_error!(
                    ErrorKind::UnsupportedDdl,
                    "Structural change cannot be applied to a replicated table",
                    format!(
                        "received {action} for `{}.{}` (query: {}), start a new replication for the resulting table",
                        current.schema,
                        current.table,
                        current.query.as_deref().unwrap_or("unknown")
                    )
                ));
            }
        }

        let mut translation = DdlTranslation::default();
        for entry in compute_column_diff(previous, &current.columns)? {
            self.translate_entry(&table, &entry, &mut translation)?;
        }

        debug!(
            table = %current.name(),
            version = current.version,
            statements = translation.statements.len(),
            "translated schema change"
        );

        Ok(translation)
    }

    /// Returns a `CREATE OR REPLACE TABLE` statement for `columns`.
    ///
    /// Columns without a target type mapping are omitted and reported as warnings.
    pub fn create_table(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> EtlResult<DdlTranslation> {
        let mut translation = DdlTranslation::default();
        let mut definitions = Vec::with_capacity(columns.len() + 1);
        let mut primary_key = Vec::new();

        for column in columns {
            let Some(definition) = self.column_definition(column, &mut translation) else {
                continue;
            };
            definitions.push(definition);
            if column.primary_key {
                primary_key.push(quote_identifier(&column.name));
            }
        }

        if definitions.is_empty() {
            return Err(etl_error!(
                ErrorKind::InvalidTableDefinition,
                "Table has no columns that can be created",
                format!("none of the {} columns of `{table}` has a target type", columns.len())
            ));
        }

        if !primary_key.is_empty() {
            definitions.push(format!("PRIMARY KEY ({})", primary_key.join(", ")));
        }

        translation.statements.push(format!(
            "CREATE OR REPLACE TABLE {} ({});",
            quote_identifier(table),
            definitions.join(", ")
        ));

        Ok(translation)
    }

    fn translate_entry(
        &self,
        table: &str,
        entry: &ColumnDiffEntry,
        translation: &mut DdlTranslation,
    ) -> EtlResult<()> {
        match (entry.action, &entry.before, &entry.after) {
            (DiffAction::Add, _, Some(after)) => {
                if let Some(definition) = self.column_definition(after, translation) {
                    translation
                        .statements
                        .push(format!("ALTER TABLE {table} ADD COLUMN {definition};"));
                }
            }
            (DiffAction::Drop, Some(before), _) => {
                translation.statements.push(format!(
                    "ALTER TABLE {table} DROP COLUMN {};",
                    quote_identifier(&before.name)
                ));
            }
            (DiffAction::Rename, Some(before), Some(after)) => {
                translation.statements.push(format!(
                    "ALTER TABLE {table} RENAME COLUMN {} TO {};",
                    quote_identifier(&before.name),
                    quote_identifier(&after.name)
                ));
                if before.attributes_differ(after) {
                    self.modify_column(table, before, after, translation)?;
                }
            }
            (DiffAction::Modify, Some(before), Some(after)) => {
                self.modify_column(table, before, after, translation)?;
            }
            _ => {}
        }

        Ok(())
    }

    fn modify_column(
        &self,
        table: &str,
        before: &ColumnDescriptor,
        after: &ColumnDescriptor,
        translation: &mut DdlTranslation,
    ) -> EtlResult<()> {
        let mut clauses = Vec::with_capacity(3);

        if !before.same_type_as(after) {
            if !self.dialect.supports_type_change() {
                return Err(etl_error!(
                    ErrorKind::UnsupportedDdl,
                    "Column type change requires recreating the table",
                    format!(
                        "{} cannot change column `{}` from `{}` to `{}` in place",
                        self.dialect, after.name, before.data_type, after.data_type
                    )
                ));
            }

            match self.dialect.render_type(after) {
                Some(data_type) => clauses.push(ModifyClause::DataType(data_type)),
                None => translation.warn(TranslationWarning::UnknownSourceType {
                    column: after.name.clone(),
                    data_type: after.data_type.clone(),
                }),
            }
        }

        if before.default != after.default {
            match &after.default {
                None => clauses.push(ModifyClause::DropDefault),
                Some(default) => translation.warn(TranslationWarning::UnsupportedDefaultChange {
                    column: after.name.clone(),
                    before: before.default.clone(),
                    after: default.clone(),
                }),
            }
        }

        if before.nullable != after.nullable {
            clauses.push(if after.nullable {
                ModifyClause::DropNotNull
            } else {
                ModifyClause::SetNotNull
            });
        }

        if clauses.is_empty() {
            return Ok(());
        }

        let column = quote_identifier(&after.name);
        match self.dialect {
            SqlDialect::Snowflake => {
                let rendered: Vec<String> = clauses
                    .iter()
                    .map(|clause| format!("COLUMN {column} {}", render_clause(clause)))
                    .collect();
                translation.statements.push(format!(
                    "ALTER TABLE {table} MODIFY {};",
                    rendered.join(", ")
                ));
            }
            SqlDialect::Redshift => {
                for clause in &clauses {
                    translation.statements.push(format!(
                        "ALTER TABLE {table} ALTER COLUMN {column} {};",
                        render_clause(clause)
                    ));
                }
            }
        }

        Ok(())
    }

    /// Renders `name TYPE [NOT NULL] [DEFAULT x | DEFAULT NULL]`, or `None` for unknown types.
    fn column_definition(
        &self,
        column: &ColumnDescriptor,
        translation: &mut DdlTranslation,
    ) -> Option<String> {
        let Some(data_type) = self.dialect.render_type(column) else {
            translation.warn(TranslationWarning::UnknownSourceType {
                column: column.name.clone(),
                data_type: column.data_type.clone(),
            });
            return None;
        };

        let mut definition = format!("{} {data_type}", quote_identifier(&column.name));
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        match &column.default {
            Some(default) => {
                definition.push_str(" DEFAULT ");
                definition.push_str(&render_literal(default));
            }
            None if column.nullable => definition.push_str(" DEFAULT NULL"),
            None => {}
        }

        Some(definition)
    }
}

fn render_clause(clause: &ModifyClause) -> String {
    match clause {
        ModifyClause::DataType(data_type) => format!("SET DATA TYPE {data_type}"),
        ModifyClause::DropDefault => "DROP DEFAULT".to_owned(),
        ModifyClause::SetNotNull => "SET NOT NULL".to_owned(),
        ModifyClause::DropNotNull => "DROP NOT NULL".to_owned(),
    }
}
