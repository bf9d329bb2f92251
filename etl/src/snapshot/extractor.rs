//! Snapshot extraction through an external dump tool.

use std::future::Future;

use config::shared::TidbConnectionConfig;
use secrecy::ExposeSecret;
use tokio::process::Command;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::types::{ConsistencyPoint, TableName};
use crate::{bail, etl_error};

/// What to extract and where to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub table: TableName,
    pub consistency_point: ConsistencyPoint,
    /// Location the part files are written to, usually `<workspace>/snapshot`.
    pub output: String,
    pub concurrency: u16,
}

/// Produces part files named `<schema>.<table>.<n>.csv` that hold the table as of the
/// consistency point of the request.
pub trait SnapshotExtractor {
    fn extract(&self, request: &ExtractRequest) -> impl Future<Output = EtlResult<()>> + Send;
}

/// Runs the `dumpling` binary.
#[derive(Debug, Clone)]
pub struct DumplingExtractor {
    path: String,
    source: TidbConnectionConfig,
}

impl DumplingExtractor {
    pub fn new(path: impl Into<String>, source: TidbConnectionConfig) -> DumplingExtractor {
        Self {
            path: path.into(),
            source,
        }
    }

    /// Returns the command line arguments, the password excluded.
    pub fn args(&self, request: &ExtractRequest) -> Vec<String> {
        let mut args = vec![
            "--host".to_owned(),
            self.source.host.clone(),
            "--port".to_owned(),
            self.source.port.to_string(),
            "--user".to_owned(),
            self.source.username.clone(),
        ];
        if let Some(ssl_ca) = self.source.tls.ssl_ca.as_ref().filter(|_| self.source.tls.enabled) {
            args.extend(["--ca".to_owned(), ssl_ca.clone()]);
        }
        args.extend(
            [
                "--filetype",
                "csv",
                "--no-header",
                "--csv-separator",
                ",",
                "--csv-delimiter",
                "\"",
                "--escape-backslash",
            ]
            .map(str::to_owned),
        );
        args.extend([
            "--snapshot".to_owned(),
            request.consistency_point.to_string(),
            "--consistency".to_owned(),
            "snapshot".to_owned(),
            "-T".to_owned(),
            request.table.to_string(),
            "-t".to_owned(),
            request.concurrency.to_string(),
            "-o".to_owned(),
            request.output.clone(),
        ]);

        args
    }
}

impl SnapshotExtractor for DumplingExtractor {
    async fn extract(&self, request: &ExtractRequest) -> EtlResult<()> {
        let args = self.args(request);
        info!(
            extractor = %self.path,
            table = %request.table,
            consistency_point = request.consistency_point,
            output = %request.output,
            "extracting snapshot"
        );

        let mut command = Command::new(&self.path);
        command.args(&args).kill_on_drop(true);
        if let Some(password) = &self.source.password {
            command.arg("--password").arg(password.expose_secret());
        }

        let output = command.output().await.map_err(|err| {
            etl_error!(
                ErrorKind::SnapshotExtractionFailed,
                "Failed to start the snapshot extractor",
                format!("`{}`", self.path),
                source: err
            )
        })?;

        if !output.status.success() {
            bail!(
                ErrorKind::SnapshotExtractionFailed,
                "Snapshot extractor failed",
                format!(
                    "`{}` exited with {}: {}",
                    self.path,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )
            );
        }

        info!(table = %request.table, "extracted snapshot");

        Ok(())
    }
}
