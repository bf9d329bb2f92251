use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Snowflake account and session settings.
///
/// Statements are sent through the SQL API, which authenticates with a programmatic access
/// token issued for [`SnowflakeConfig::user`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnowflakeConfig {
    /// Account identifier, e.g. `myorg-myaccount`.
    pub account_id: String,
    #[serde(default = "default_warehouse")]
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub user: String,
    #[serde(default)]
    pub role: Option<String>,
    pub token: SerializableSecretString,
    /// Overrides `https://<account_id>.snowflakecomputing.com`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Storage integration used to create stages over GCS workspaces.
    #[serde(default)]
    pub storage_integration: Option<String>,
}

impl SnowflakeConfig {
    /// Base URL of the SQL API for this account.
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_owned(),
            None => format!("https://{}.snowflakecomputing.com", self.account_id),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.account_id.is_empty() && self.endpoint.is_none() {
            return Err(ValidationError::MissingField("warehouse.account_id"));
        }
        if self.database.is_empty() {
            return Err(ValidationError::MissingField("warehouse.database"));
        }
        if self.schema.is_empty() {
            return Err(ValidationError::MissingField("warehouse.schema"));
        }
        if self.user.is_empty() {
            return Err(ValidationError::MissingField("warehouse.user"));
        }
        if self.token.is_empty() {
            return Err(ValidationError::MissingField("warehouse.token"));
        }

        Ok(())
    }
}

fn default_warehouse() -> String {
    "COMPUTE_WH".to_owned()
}
