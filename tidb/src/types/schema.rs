use std::fmt;
use std::str::FromStr;

/// A fully qualified TiDB table name.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TableName {
    /// The schema (database) containing the table.
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the name quoted with backticks for use in TiDB statements.
    pub fn as_quoted_identifier(&self) -> String {
        format!(
            "`{}`.`{}`",
            self.schema.replace('`', "``"),
            self.name.replace('`', "``")
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Error returned when a string is not a `schema.table` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTableNameError(pub String);

impl fmt::Display for ParseTableNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` is not a `<schema>.<table>` name", self.0)
    }
}

impl std::error::Error for ParseTableNameError {}

impl FromStr for TableName {
    type Err = ParseTableNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() && !name.contains('.') => {
                Ok(TableName::new(schema, name))
            }
            _ => Err(ParseTableNameError(s.to_owned())),
        }
    }
}

/// Description of one column of a replicated table.
///
/// `data_type` is the lowercase logical type name (`varchar`, `decimal`, `int unsigned`, ...).
/// `precision` carries the length of string and binary types, the precision of decimals and the
/// fractional seconds of temporal types. Descriptors are values: a change produces a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub nullable: bool,
    /// Default value as an untyped literal, `None` when the column has no default.
    pub default: Option<String>,
    pub primary_key: bool,
    /// Stable column id assigned by the source, when known.
    pub id: Option<i64>,
}

impl ColumnDescriptor {
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        primary_key: bool,
    ) -> ColumnDescriptor {
        Self {
            name: name.into(),
            data_type: data_type.into().to_lowercase(),
            precision: None,
            scale: None,
            nullable,
            default: None,
            primary_key,
            id: None,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns `true` when both columns have the same type, precision and scale.
    pub fn same_type_as(&self, other: &ColumnDescriptor) -> bool {
        self.data_type.eq_ignore_ascii_case(&other.data_type)
            && self.precision == other.precision
            && self.scale == other.scale
    }

    /// Returns `true` when anything but the name differs.
    pub fn attributes_differ(&self, other: &ColumnDescriptor) -> bool {
        !self.same_type_as(other)
            || self.nullable != other.nullable
            || self.default != other.default
            || self.primary_key != other.primary_key
    }
}
