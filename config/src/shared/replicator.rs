use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::Config;
use crate::shared::{
    CaptureConfig, SnapshotConfig, SnowflakeConfig, TidbConnectionConfig, ValidationError,
};

/// Object-storage schemes a warehouse stage can read from. `memory` only serves dry runs.
const SUPPORTED_WORKSPACE_SCHEMES: &[&str] = &["s3", "gs", "gcs", "memory"];

/// Which phases a replication run is allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    /// Snapshot bootstrap followed by continuous change application.
    #[default]
    Full,
    SnapshotOnly,
    IncrementalOnly,
}

impl ReplicationMode {
    pub fn includes_snapshot(&self) -> bool {
        matches!(self, ReplicationMode::Full | ReplicationMode::SnapshotOnly)
    }

    pub fn includes_incremental(&self) -> bool {
        matches!(self, ReplicationMode::Full | ReplicationMode::IncrementalOnly)
    }
}

impl fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationMode::Full => f.write_str("full"),
            ReplicationMode::SnapshotOnly => f.write_str("snapshot-only"),
            ReplicationMode::IncrementalOnly => f.write_str("incremental-only"),
        }
    }
}

/// Complete configuration of one replication job.
///
/// Built once at startup, validated, then shared by reference for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReplicatorConfig {
    #[serde(default)]
    pub mode: ReplicationMode,
    /// Source table as `<schema>.<table>`.
    pub table: String,
    /// Object-storage location shared by the snapshot files, the change files and the markers.
    pub workspace: String,
    #[serde(default)]
    pub source: TidbConnectionConfig,
    pub warehouse: SnowflakeConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// Session time zone of warehouse statements. Uses the account default when unset.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Config for ReplicatorConfig {
    const NAME: &'static str = "replicator";
}

impl ReplicatorConfig {
    /// Splits [`ReplicatorConfig::table`] into schema and table.
    pub fn table_parts(&self) -> Result<(&str, &str), ValidationError> {
        split_table_name(&self.table)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.table_parts()?;
        validate_workspace(&self.workspace)?;
        self.source.validate()?;
        self.warehouse.validate()?;
        self.capture.validate()?;
        self.snapshot.validate()?;

        if self.capture.sink_uri.is_some() && self.mode != ReplicationMode::IncrementalOnly {
            return Err(ValidationError::InvalidConfig(
                "an external sink uri can only be used in incremental-only mode".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Splits `schema.table` into its two identifiers.
pub fn split_table_name(fqn: &str) -> Result<(&str, &str), ValidationError> {
    let invalid = || ValidationError::InvalidTableName(fqn.to_owned());

    let (schema, table) = fqn.split_once('.').ok_or_else(invalid)?;
    if schema.is_empty() || table.is_empty() || table.contains('.') {
        return Err(invalid());
    }
    if [schema, table]
        .iter()
        .any(|part| part.chars().any(|c| c.is_whitespace() || c == '`'))
    {
        return Err(invalid());
    }

    Ok((schema, table))
}

fn validate_workspace(workspace: &str) -> Result<(), ValidationError> {
    let url = Url::parse(workspace)
        .map_err(|err| ValidationError::InvalidWorkspace(workspace.to_owned(), err.to_string()))?;

    if !SUPPORTED_WORKSPACE_SCHEMES.contains(&url.scheme()) {
        return Err(ValidationError::InvalidWorkspace(
            workspace.to_owned(),
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReplicatorConfig {
        serde_json::from_value(serde_json::json!({
            "table": "shop.orders",
            "workspace": "s3://bucket/replication",
            "warehouse": {
                "account_id": "org-account",
                "database": "ANALYTICS",
                "schema": "PUBLIC",
                "user": "REPLICATOR",
                "token": "secret"
            }
        }))
        .unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let config = config();

        assert_eq!(config.mode, ReplicationMode::Full);
        assert_eq!(config.source.port, 4000);
        assert_eq!(config.capture.port, 8300);
        assert_eq!(config.capture.file_size, 64 * 1024 * 1024);
        assert_eq!(config.snapshot.concurrency, 8);
        assert_eq!(config.warehouse.warehouse, "COMPUTE_WH");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn table_name_must_have_two_parts() {
        assert_eq!(split_table_name("a.b").unwrap(), ("a", "b"));

        for invalid in ["orders", "a.b.c", ".b", "a.", "a b.c"] {
            assert_eq!(
                split_table_name(invalid),
                Err(ValidationError::InvalidTableName(invalid.to_owned()))
            );
        }
    }

    #[test]
    fn unsupported_workspace_scheme_is_rejected() {
        let mut config = config();
        for workspace in ["ftp://host/path", "file:///tmp/replication"] {
            config.workspace = workspace.to_owned();

            assert!(matches!(
                config.validate(),
                Err(ValidationError::InvalidWorkspace(_, _))
            ));
        }
    }

    #[test]
    fn external_sink_requires_incremental_only_mode() {
        let mut config = config();
        config.capture.sink_uri = Some("s3://bucket/replication/increment".to_owned());
        assert!(config.validate().is_err());

        config.mode = ReplicationMode::IncrementalOnly;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn poll_interval_is_a_fifth_of_the_flush_interval() {
        let config = config();

        assert_eq!(config.capture.poll_interval().as_secs(), 12);
    }
}
