use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Connection settings for the TiDB source cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TidbConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    /// Password for [`TidbConnectionConfig::username`]. Redacted in debug output.
    #[serde(default)]
    pub password: Option<SerializableSecretString>,
    #[serde(default)]
    pub tls: TidbTlsConfig,
}

/// TLS settings for the source connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TidbTlsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path to a PEM file with the CA that signed the server certificate.
    #[serde(default)]
    pub ssl_ca: Option<String>,
}

impl TidbConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::MissingField("source.host"));
        }
        if self.username.is_empty() {
            return Err(ValidationError::MissingField("source.username"));
        }
        if self.tls.enabled && self.tls.ssl_ca.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::InvalidConfig(
                "`source.tls.ssl_ca` must be set when TLS is enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for TidbConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: None,
            tls: TidbTlsConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    4000
}

fn default_username() -> String {
    "root".to_owned()
}
