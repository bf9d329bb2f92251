use secrecy::ExposeSecret;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use std::time::Duration;
use tracing::info;

use config::shared::TidbConnectionConfig;

use crate::error::TidbError;

/// Connections kept by the source pool; introspection is sequential.
const MAX_SOURCE_CONNECTIONS: u32 = 2;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Conversion of the configuration into driver specific connection options.
pub trait IntoConnectOptions<Output> {
    /// Options for the server without selecting a database.
    fn without_db(&self) -> Output;

    /// Options with `database` selected as the default database.
    fn with_db(&self, database: &str) -> Output;
}

impl IntoConnectOptions<MySqlConnectOptions> for TidbConnectionConfig {
    fn without_db(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .charset("utf8mb4");

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        match (&self.tls.enabled, &self.tls.ssl_ca) {
            (true, Some(ssl_ca)) => options.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(ssl_ca),
            (true, None) => options.ssl_mode(MySqlSslMode::Required),
            (false, _) => options.ssl_mode(MySqlSslMode::Preferred),
        }
    }

    fn with_db(&self, database: &str) -> MySqlConnectOptions {
        self.without_db().database(database)
    }
}

/// Opens the source pool and checks that the cluster answers.
pub async fn connect_source(config: &TidbConnectionConfig) -> Result<MySqlPool, TidbError> {
    if let Some(ssl_ca) = config.tls.ssl_ca.as_deref().filter(|_| config.tls.enabled) {
        std::fs::metadata(ssl_ca).map_err(|source| TidbError::InvalidCertificate {
            path: ssl_ca.to_owned(),
            source,
        })?;
    }

    let pool = MySqlPoolOptions::new()
        .min_connections(1)
        .max_connections(MAX_SOURCE_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(config.without_db())
        .await
        .map_err(TidbError::Connection)?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(TidbError::Connection)?;

    info!(host = %config.host, port = config.port, "connected to tidb");

    Ok(pool)
}
