//! Error types and result definitions for replication operations.
//!
//! [`EtlError`] carries a classification ([`ErrorKind`]), a static description, optional dynamic
//! detail, an optional source error, the location it was raised at and a backtrace. Errors from
//! several independent operations can be aggregated into one value.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type of every fallible replication operation.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Errors of independent operations that failed together, e.g. a load and its teardown.
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Classification of replication failures.
///
/// Kinds are grouped by the component that raises them. Connectivity kinds are fatal for the
/// current run only: a later invocation retries from the durable markers.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration
    ConfigError,
    InvalidIdentifier,

    // Connectivity
    SourceConnectionFailed,
    DestinationConnectionFailed,
    StorageConnectionFailed,
    CaptureConnectionFailed,
    AuthenticationError,

    // Query execution
    SourceQueryFailed,
    DestinationQueryFailed,

    // Schema translation
    UnsupportedDdl,
    InvalidTableDefinition,
    MissingPrimaryKey,

    // Snapshot
    SnapshotExtractionFailed,
    NoSnapshotFiles,
    BulkLoadFailed,
    ProgressObservationFailed,

    // Change capture
    CaptureRegistrationFailed,

    // Storage and serialization
    StorageError,
    IoError,
    SerializationError,
    DeserializationError,
    InvalidData,

    // Workflow
    InvalidState,

    Unknown,

    /// Raised by fault injection in tests.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error, or of the first aggregated error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors"),
        }
    }

    /// Returns the dynamic detail, or the first detail found among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns `true` when the error means a collaborator could not be reached.
    pub fn is_connectivity(&self) -> bool {
        self.kinds().iter().any(|kind| {
            matches!(
                kind,
                ErrorKind::SourceConnectionFailed
                    | ErrorKind::DestinationConnectionFailed
                    | ErrorKind::StorageConnectionFailed
                    | ErrorKind::CaptureConnectionFailed
            )
        })
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    ///
    /// Aggregated errors ignore it and forward their first error instead.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn wrap<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail:")?;
                    write_indented(f, detail, "    ")?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write!(f, "\n  Backtrace:")?;
                    write_indented(f, &backtrace, "    ")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    errors.len(),
                    if errors.len() == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, text: &str, indent: &str) -> fmt::Result {
    for line in text.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent}")?;
        } else {
            write!(f, "\n{indent}{line}")?;
        }
    }

    Ok(())
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();
        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::wrap(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::wrap(kind, description, err)
    }
}

impl From<std::num::ParseIntError> for EtlError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> EtlError {
        EtlError::wrap(ErrorKind::InvalidData, "Integer parsing failed", err)
    }
}

impl From<uuid::Error> for EtlError {
    #[track_caller]
    fn from(err: uuid::Error) -> EtlError {
        EtlError::wrap(ErrorKind::InvalidData, "UUID parsing failed", err)
    }
}

impl From<url::ParseError> for EtlError {
    #[track_caller]
    fn from(err: url::ParseError) -> EtlError {
        EtlError::wrap(ErrorKind::ConfigError, "URL parsing failed", err)
    }
}

/// Connection level failures map to [`ErrorKind::SourceConnectionFailed`].
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let kind = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => ErrorKind::SourceConnectionFailed,
            _ => ErrorKind::SourceQueryFailed,
        };

        EtlError::wrap(kind, "Source database operation failed", err)
    }
}

impl From<tidb::error::TidbError> for EtlError {
    #[track_caller]
    fn from(err: tidb::error::TidbError) -> EtlError {
        let (kind, description) = match &err {
            _ if err.is_connection_error() => (
                ErrorKind::SourceConnectionFailed,
                "Could not connect to the source database",
            ),
            tidb::error::TidbError::TableNotFound(_) => {
                (ErrorKind::ConfigError, "Source table was not found")
            }
            tidb::error::TidbError::InvalidCertificate { .. } => {
                (ErrorKind::ConfigError, "Source TLS configuration is invalid")
            }
            _ => (ErrorKind::SourceQueryFailed, "Source database query failed"),
        };

        EtlError::wrap(kind, description, err)
    }
}

/// Connect and timeout failures map to [`ErrorKind::DestinationConnectionFailed`].
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::DestinationConnectionFailed,
                "Could not reach the warehouse",
            )
        } else if err.is_decode() {
            (
                ErrorKind::DeserializationError,
                "Warehouse response could not be decoded",
            )
        } else {
            (ErrorKind::DestinationQueryFailed, "Warehouse request failed")
        };

        EtlError::wrap(kind, description, err)
    }
}

impl From<object_store::Error> for EtlError {
    #[track_caller]
    fn from(err: object_store::Error) -> EtlError {
        let kind = match &err {
            object_store::Error::Generic { .. } => ErrorKind::StorageConnectionFailed,
            _ => ErrorKind::StorageError,
        };

        EtlError::wrap(kind, "Workspace storage operation failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, etl_error};

    #[test]
    fn display_includes_kind_description_and_detail() {
        let err = etl_error!(
            ErrorKind::UnsupportedDdl,
            "Table DDL is not supported",
            "rename-tables on shop.orders"
        );
        let rendered = err.to_string();

        assert!(rendered.starts_with("[UnsupportedDdl] Table DDL is not supported @ "));
        assert!(rendered.contains("rename-tables on shop.orders"));
        assert_eq!(err.detail(), Some("rename-tables on shop.orders"));
    }

    #[test]
    fn single_error_vector_is_not_wrapped() {
        let err: EtlError = vec![etl_error!(ErrorKind::StorageError, "failed")].into();

        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert!(err.backtrace().is_some());
    }

    #[test]
    fn aggregated_errors_expose_all_kinds() {
        let err: EtlError = vec![
            etl_error!(ErrorKind::BulkLoadFailed, "load failed"),
            etl_error!(ErrorKind::DestinationConnectionFailed, "drop stage failed"),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::BulkLoadFailed);
        assert_eq!(
            err.kinds(),
            vec![
                ErrorKind::BulkLoadFailed,
                ErrorKind::DestinationConnectionFailed
            ]
        );
        assert!(err.is_connectivity());
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn bail_returns_early() {
        fn check(value: u32) -> EtlResult<u32> {
            if value == 0 {
                bail!(ErrorKind::ConfigError, "Value must not be zero");
            }
            Ok(value)
        }

        assert_eq!(check(1).unwrap(), 1);
        assert_eq!(check(0).unwrap_err().kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("disk full");
        let err = EtlError::from(io);

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(error::Error::source(&err).is_some());
    }
}
