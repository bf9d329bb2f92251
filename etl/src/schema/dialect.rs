use std::fmt;

use crate::types::ColumnDescriptor;

/// Target SQL dialect of the emitted DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Snowflake,
    Redshift,
}

impl SqlDialect {
    /// Whether a column type can be changed in place with `ALTER TABLE`.
    pub fn supports_type_change(&self) -> bool {
        match self {
            SqlDialect::Snowflake => true,
            SqlDialect::Redshift => false,
        }
    }

    /// Renders the target type of `column`, or `None` when the source type has no mapping.
    pub fn render_type(&self, column: &ColumnDescriptor) -> Option<String> {
        let base = base_type(&column.data_type);
        match self {
            SqlDialect::Snowflake => snowflake_type(&base, column),
            SqlDialect::Redshift => redshift_type(&base, column),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Snowflake => f.write_str("snowflake"),
            SqlDialect::Redshift => f.write_str("redshift"),
        }
    }
}

/// Lowercase type name without modifiers: `INT UNSIGNED` and `varchar(20)` become `int` and
/// `varchar`.
fn base_type(data_type: &str) -> String {
    let first = data_type.split_whitespace().next().unwrap_or_default();
    let name = first.split('(').next().unwrap_or_default();
    name.to_lowercase()
}

fn snowflake_type(base: &str, column: &ColumnDescriptor) -> Option<String> {
    let rendered = match base {
        "text" | "longtext" | "mediumtext" | "tinytext" | "blob" | "longblob" | "mediumblob"
        | "tinyblob" => "TEXT".to_owned(),
        "varchar" | "char" | "binary" | "varbinary" => with_length(base, column.precision),
        "int" | "integer" | "mediumint" | "year" => "INT".to_owned(),
        "bigint" | "tinyint" | "smallint" | "float" | "double" => base.to_uppercase(),
        "decimal" | "numeric" => with_precision_and_scale("DECIMAL", column),
        "bool" | "boolean" => "BOOLEAN".to_owned(),
        "date" => "DATE".to_owned(),
        "datetime" | "timestamp" | "time" => with_length(base, column.precision),
        "json" => "VARIANT".to_owned(),
        _ => return None,
    };

    Some(rendered)
}

fn redshift_type(base: &str, column: &ColumnDescriptor) -> Option<String> {
    let rendered = match base {
        "text" | "longtext" | "mediumtext" | "tinytext" => "VARCHAR(65535)".to_owned(),
        "blob" | "longblob" | "mediumblob" | "tinyblob" => "VARBYTE(65535)".to_owned(),
        "varchar" | "char" => with_length(base, column.precision),
        "binary" | "varbinary" => with_length("varbyte", column.precision),
        "int" | "integer" | "mediumint" | "year" => "INTEGER".to_owned(),
        "tinyint" | "smallint" => "SMALLINT".to_owned(),
        "bigint" => "BIGINT".to_owned(),
        "float" => "REAL".to_owned(),
        "double" => "DOUBLE PRECISION".to_owned(),
        "decimal" | "numeric" => with_precision_and_scale("DECIMAL", column),
        "bool" | "boolean" => "BOOLEAN".to_owned(),
        "date" => "DATE".to_owned(),
        "datetime" | "timestamp" => "TIMESTAMP".to_owned(),
        "time" => "TIME".to_owned(),
        _ => return None,
    };

    Some(rendered)
}

fn with_length(base: &str, length: Option<u32>) -> String {
    match length {
        Some(length) => format!("{}({length})", base.to_uppercase()),
        None => base.to_uppercase(),
    }
}

fn with_precision_and_scale(name: &str, column: &ColumnDescriptor) -> String {
    match (column.precision, column.scale) {
        (Some(precision), Some(scale)) => format!("{name}({precision}, {scale})"),
        (Some(precision), None) => format!("{name}({precision})"),
        _ => name.to_owned(),
    }
}
