//! Warehouse stages over the workspace.

use tracing::{info, warn};

use crate::destination::Warehouse;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::sql::{quote_identifier, quote_string};
use crate::{bail, etl_error};

/// File format of every staged CSV file, snapshot parts and change files alike.
pub const CSV_FILE_FORMAT: &str = "TYPE = 'CSV' EMPTY_FIELD_AS_NULL = FALSE NULL_IF = ('\\\\N') FIELD_OPTIONALLY_ENCLOSED_BY = '\"'";

/// How the warehouse reaches the files behind a stage.
#[derive(Clone, PartialEq, Eq)]
pub enum StageCredentials {
    /// Static AWS credentials for an S3 location.
    S3 {
        key_id: String,
        secret_key: String,
        session_token: Option<String>,
    },
    /// A storage integration granted access to a GCS location.
    StorageIntegration(String),
    /// A stage managed by the warehouse itself, for in-memory workspaces.
    Internal,
}

impl std::fmt::Debug for StageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageCredentials::S3 { key_id, .. } => {
                write!(f, "S3 {{ key_id: {key_id:?}, secret_key: [REDACTED] }}")
            }
            StageCredentials::StorageIntegration(name) => {
                write!(f, "StorageIntegration({name:?})")
            }
            StageCredentials::Internal => write!(f, "Internal"),
        }
    }
}

impl StageCredentials {
    /// Resolves the credentials of a stage over the workspace at `url`.
    ///
    /// S3 credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN`. GCS locations need `storage_integration`.
    pub fn resolve(url: &str, storage_integration: Option<&str>) -> EtlResult<StageCredentials> {
        let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
        match scheme {
            "s3" => {
                let (Ok(key_id), Ok(secret_key)) = (
                    std::env::var("AWS_ACCESS_KEY_ID"),
                    std::env::var("AWS_SECRET_ACCESS_KEY"),
                ) else {
                    bail!(
                        ErrorKind::ConfigError,
                        "Missing AWS credentials for an S3 stage",
                        "set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY"
                    );
                };

                Ok(StageCredentials::S3 {
                    key_id,
                    secret_key,
                    session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
                })
            }
            "gs" | "gcs" => match storage_integration {
                Some(name) => Ok(StageCredentials::StorageIntegration(name.to_owned())),
                None => bail!(
                    ErrorKind::ConfigError,
                    "A storage integration is required for GCS stages",
                    format!("no storage integration configured for `{url}`")
                ),
            },
            "memory" => Ok(StageCredentials::Internal),
            "file" => bail!(
                ErrorKind::ConfigError,
                "Local workspaces cannot be staged",
                format!("the warehouse cannot read `{url}`, use an `s3://` or `gs://` workspace")
            ),
            other => bail!(
                ErrorKind::ConfigError,
                "Unsupported stage location",
                format!("scheme `{other}` of `{url}`")
            ),
        }
    }
}

/// A named warehouse stage bound to a workspace location.
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    url: String,
    allowed_location: String,
    credentials: StageCredentials,
}

impl Stage {
    /// `url` is the location the stage points to. Its trailing slash is added when missing.
    ///
    /// A storage integration created for the stage is allowed on `url` only, unless widened with
    /// [`Stage::with_allowed_location`].
    pub fn new(name: impl Into<String>, url: &str, credentials: StageCredentials) -> Stage {
        let url = stage_location(url);

        Self {
            name: name.into(),
            allowed_location: url.clone(),
            url,
            credentials,
        }
    }

    /// Allows the storage integration of the stage on `location`, usually the workspace root.
    ///
    /// Every stage of a workspace shares one integration, so its allowed location has to cover
    /// all of them.
    pub fn with_allowed_location(mut self, location: &str) -> Self {
        self.allowed_location = stage_location(location);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn create_sql(&self) -> String {
        let name = quote_identifier(&self.name);
        match &self.credentials {
            StageCredentials::S3 {
                key_id,
                secret_key,
                session_token,
            } => {
                let token = session_token
                    .as_deref()
                    .map(|token| format!(" AWS_TOKEN = {}", quote_string(token)))
                    .unwrap_or_default();
                format!(
                    "CREATE OR REPLACE STAGE {name} URL = {} CREDENTIALS = (AWS_KEY_ID = {} AWS_SECRET_KEY = {}{token}) FILE_FORMAT = ({CSV_FILE_FORMAT});",
                    quote_string(&self.url),
                    quote_string(key_id),
                    quote_string(secret_key),
                )
            }
            StageCredentials::StorageIntegration(integration) => format!(
                "CREATE OR REPLACE STAGE {name} URL = {} STORAGE_INTEGRATION = {} FILE_FORMAT = ({CSV_FILE_FORMAT});",
                quote_string(&self.url),
                quote_identifier(integration),
            ),
            StageCredentials::Internal => {
                format!("CREATE OR REPLACE STAGE {name} FILE_FORMAT = ({CSV_FILE_FORMAT});")
            }
        }
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP STAGE IF EXISTS {};", quote_identifier(&self.name))
    }

    /// Creates the stage, and the storage integration it relies on when it does not exist yet.
    pub async fn create<W>(&self, warehouse: &W) -> EtlResult<()>
    where
        W: Warehouse + Sync,
    {
        if let StageCredentials::StorageIntegration(integration) = &self.credentials {
            self.ensure_storage_integration(warehouse, integration)
                .await?;
        }

        warehouse.execute(&self.create_sql()).await?;
        info!(stage = %self.name, url = %self.url, "created stage");

        Ok(())
    }

    /// Drops the stage, logging instead of failing.
    pub async fn drop_quietly<W>(&self, warehouse: &W)
    where
        W: Warehouse + Sync,
    {
        match warehouse.execute(&self.drop_sql()).await {
            Ok(_) => info!(stage = %self.name, "dropped stage"),
            Err(err) => warn!(stage = %self.name, error = %err, "failed to drop stage"),
        }
    }

    async fn ensure_storage_integration<W>(&self, warehouse: &W, integration: &str) -> EtlResult<()>
    where
        W: Warehouse + Sync,
    {
        let name = quote_identifier(integration);
        warehouse
            .execute(&format!(
                "CREATE STORAGE INTEGRATION IF NOT EXISTS {name} TYPE = EXTERNAL_STAGE STORAGE_PROVIDER = 'GCS' ENABLED = TRUE STORAGE_ALLOWED_LOCATIONS = ({});",
                quote_string(&self.allowed_location)
            ))
            .await?;

        let description = warehouse
            .execute(&format!("DESC STORAGE INTEGRATION {name};"))
            .await?;
        let service_account = (0..description.rows.len()).find_map(|row| {
            (description.get(row, "property") == Some("STORAGE_GCP_SERVICE_ACCOUNT"))
                .then(|| description.get(row, "property_value"))
                .flatten()
        });

        match service_account {
            Some(account) => info!(
                integration,
                service_account = account,
                "grant this service account access to the workspace bucket"
            ),
            None => {
                return Err(etl_error!(
                    ErrorKind::DestinationQueryFailed,
                    "Storage integration has no GCP service account",
                    format!("`DESC STORAGE INTEGRATION {integration}` returned no STORAGE_GCP_SERVICE_ACCOUNT")
                ));
            }
        }

        Ok(())
    }
}

/// Location in the warehouse's notation, with a trailing slash.
fn stage_location(url: &str) -> String {
    let url = match url.split_once("://") {
        // The warehouse names Google Cloud Storage locations `gcs://`.
        Some(("gs", rest)) => format!("gcs://{rest}"),
        _ => url.to_owned(),
    };

    format!("{}/", url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::QueryResult;
    use crate::destination::memory::MemoryWarehouse;

    #[test]
    fn s3_stage_carries_credentials() {
        let stage = Stage::new(
            "snapshot_stage_t",
            "s3://bucket/job/snapshot",
            StageCredentials::S3 {
                key_id: "AKIA".to_owned(),
                secret_key: "se'cret".to_owned(),
                session_token: None,
            },
        );

        assert_eq!(
            stage.create_sql(),
            "CREATE OR REPLACE STAGE snapshot_stage_t URL = 's3://bucket/job/snapshot/' \
             CREDENTIALS = (AWS_KEY_ID = 'AKIA' AWS_SECRET_KEY = 'se''cret') \
             FILE_FORMAT = (TYPE = 'CSV' EMPTY_FIELD_AS_NULL = FALSE NULL_IF = ('\\\\N') FIELD_OPTIONALLY_ENCLOSED_BY = '\"');"
        );
        assert_eq!(stage.drop_sql(), "DROP STAGE IF EXISTS snapshot_stage_t;");
    }

    #[test]
    fn gs_locations_use_the_gcs_scheme() {
        let stage = Stage::new(
            "increment_stage_t",
            "gs://bucket/job/increment/",
            StageCredentials::StorageIntegration("tidb_gcs".to_owned()),
        );

        assert_eq!(stage.url(), "gcs://bucket/job/increment/");
        assert!(stage.create_sql().contains("STORAGE_INTEGRATION = tidb_gcs"));
    }

    #[test]
    fn gcs_requires_a_storage_integration() {
        let err = StageCredentials::resolve("gs://bucket/job", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        assert_eq!(
            StageCredentials::resolve("memory:///", None).unwrap(),
            StageCredentials::Internal
        );
    }

    #[test]
    fn local_workspaces_cannot_be_staged() {
        let err = StageCredentials::resolve("file:///tmp/job/snapshot", None).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn storage_integration_is_described() {
        let warehouse = MemoryWarehouse::new();
        warehouse
            .respond(
                "DESC STORAGE INTEGRATION",
                QueryResult::new(
                    vec!["property".into(), "property_type".into(), "property_value".into()],
                    vec![vec![
                        Some("STORAGE_GCP_SERVICE_ACCOUNT".into()),
                        Some("String".into()),
                        Some("sa@project.iam.gserviceaccount.com".into()),
                    ]],
                ),
            )
            .await;
        let stage = Stage::new(
            "snapshot_stage_t",
            "gs://bucket/job/snapshot",
            StageCredentials::StorageIntegration("tidb_gcs".to_owned()),
        )
        .with_allowed_location("gs://bucket/job");

        stage.create(&warehouse).await.unwrap();

        let statements = warehouse.statements().await;
        assert!(statements[0].starts_with("CREATE STORAGE INTEGRATION IF NOT EXISTS tidb_gcs"));
        assert!(statements[0].ends_with("STORAGE_ALLOWED_LOCATIONS = ('gcs://bucket/job/');"));
        assert!(statements[2].contains("URL = 'gcs://bucket/job/snapshot/'"));
        assert_eq!(statements[1], "DESC STORAGE INTEGRATION tidb_gcs;");
        assert!(statements[2].starts_with("CREATE OR REPLACE STAGE snapshot_stage_t"));
    }
}
