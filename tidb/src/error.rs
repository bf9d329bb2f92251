use thiserror::Error;

use crate::types::TableName;

/// Errors returned by TiDB introspection queries.
#[derive(Debug, Error)]
pub enum TidbError {
    #[error("could not connect to TiDB: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("TiDB query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("table {0} does not exist or has no columns")]
    TableNotFound(TableName),

    #[error("TiDB returned an invalid consistency point `{0}`")]
    InvalidConsistencyPoint(String),

    #[error("could not read CA file `{path}`: {source}")]
    InvalidCertificate {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TidbError {
    /// Returns `true` when the error means the cluster could not be reached.
    pub fn is_connection_error(&self) -> bool {
        match self {
            TidbError::Connection(_) => true,
            TidbError::Query(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}
