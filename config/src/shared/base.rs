use thiserror::Error;

/// Errors raised while validating a configuration before any side effect happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The table to replicate is not a `schema.table` pair of identifiers.
    #[error("Invalid table name `{0}`: expected `<schema>.<table>`")]
    InvalidTableName(String),

    /// The workspace location cannot be used as object storage.
    #[error("Invalid workspace `{0}`: {1}")]
    InvalidWorkspace(String, String),

    /// A required field is empty.
    #[error("Missing required configuration value `{0}`")]
    MissingField(&'static str),

    /// General configuration validation error.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
