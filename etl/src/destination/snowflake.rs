//! Snowflake warehouse over the SQL API v2.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use config::shared::SnowflakeConfig;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::destination::{QueryResult, Warehouse};
use crate::error::{ErrorKind, EtlResult};
use crate::{bail, etl_error};

const STATEMENTS_PATH: &str = "/api/v2/statements";

/// Delay between two status checks of a statement that is still running.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Timeout of a single HTTP request. Long statements are polled, so requests stay short.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parameters: HashMap<&'static str, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sql_state: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    statement_status_url: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    /// Set when the API answered `202 Accepted`.
    #[serde(skip)]
    running: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug)]
struct Inner {
    client: Client,
    base_url: String,
    token: Secret<String>,
    database: String,
    schema: String,
    warehouse: String,
    role: Option<String>,
    timezone: Option<String>,
}

/// Client of the Snowflake SQL API authenticated with a programmatic access token.
///
/// Clones share the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct SnowflakeClient {
    inner: Arc<Inner>,
}

impl SnowflakeClient {
    pub fn new(config: &SnowflakeConfig, timezone: Option<String>) -> EtlResult<SnowflakeClient> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                etl_error!(
                    ErrorKind::ConfigError,
                    "Failed to build the Snowflake HTTP client",
                    source: err
                )
            })?;

        info!(
            account = %config.account_id,
            database = %config.database,
            schema = %config.schema,
            "created snowflake client"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url: config.base_url(),
                token: Secret::new(config.token.expose_secret().clone()),
                database: config.database.clone(),
                schema: config.schema.clone(),
                warehouse: config.warehouse.clone(),
                role: config.role.clone(),
                timezone,
            }),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .bearer_auth(self.inner.token.expose_secret())
            .header(
                "X-Snowflake-Authorization-Token-Type",
                "PROGRAMMATIC_ACCESS_TOKEN",
            )
            .header("Accept", "application/json")
    }

    fn status_url(&self, response: &StatementResponse) -> EtlResult<String> {
        match (&response.statement_status_url, &response.statement_handle) {
            (Some(path), _) => Ok(format!("{}{path}", self.inner.base_url)),
            (None, Some(handle)) => Ok(format!(
                "{}{STATEMENTS_PATH}/{handle}",
                self.inner.base_url
            )),
            (None, None) => bail!(
                ErrorKind::DestinationQueryFailed,
                "Snowflake accepted a statement without returning its handle"
            ),
        }
    }

    async fn submit(&self, sql: &str) -> EtlResult<StatementResponse> {
        let mut parameters = HashMap::new();
        if let Some(timezone) = &self.inner.timezone {
            parameters.insert("TIMEZONE", timezone.clone());
        }

        let body = StatementRequest {
            statement: sql,
            database: &self.inner.database,
            schema: &self.inner.schema,
            warehouse: &self.inner.warehouse,
            role: self.inner.role.as_deref(),
            parameters,
        };

        let url = format!(
            "{}{STATEMENTS_PATH}?requestId={}",
            self.inner.base_url,
            Uuid::new_v4()
        );
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await?;

        let mut statement = read_response(response).await?;
        while statement.is_running() {
            let url = self.status_url(&statement)?;
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            let response = self.request(reqwest::Method::GET, &url).send().await?;
            statement = read_response(response).await?;
        }

        Ok(statement)
    }

    async fn fetch_partition(&self, handle: &str, partition: usize) -> EtlResult<StatementResponse> {
        let url = format!(
            "{}{STATEMENTS_PATH}/{handle}?partition={partition}",
            self.inner.base_url
        );
        let response = self.request(reqwest::Method::GET, &url).send().await?;

        read_response(response).await
    }
}

impl StatementResponse {
    fn is_running(&self) -> bool {
        self.running
    }
}

/// Maps an HTTP response of the SQL API to a statement result or an error.
async fn read_response(response: Response) -> EtlResult<StatementResponse> {
    let status = response.status();
    match status {
        StatusCode::OK | StatusCode::ACCEPTED => {
            let mut statement: StatementResponse = response.json().await?;
            statement.running = status == StatusCode::ACCEPTED;
            Ok(statement)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let body = response.text().await.unwrap_or_default();
            bail!(
                ErrorKind::AuthenticationError,
                "Snowflake rejected the access token",
                format!("HTTP {status}: {body}")
            )
        }
        StatusCode::UNPROCESSABLE_ENTITY => {
            let statement: StatementResponse = response.json().await?;
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Snowflake statement failed",
                format!(
                    "{} (sql state {})",
                    statement.message.unwrap_or_default(),
                    statement.sql_state.as_deref().unwrap_or("unknown")
                )
            )
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Snowflake SQL API returned an unexpected status",
                format!("HTTP {status}: {body}")
            )
        }
    }
}

impl Warehouse for SnowflakeClient {
    fn name() -> &'static str {
        "snowflake"
    }

    async fn execute(&self, sql: &str) -> EtlResult<QueryResult> {
        let statement = self.submit(sql).await?;
        let metadata = statement.result_set_meta_data.unwrap_or(ResultSetMetaData {
            row_type: vec![],
            partition_info: vec![],
        });

        let columns = metadata.row_type.into_iter().map(|row| row.name).collect();
        let mut rows = statement.data;

        if metadata.partition_info.len() > 1 {
            let Some(handle) = statement.statement_handle.as_deref() else {
                bail!(
                    ErrorKind::DestinationQueryFailed,
                    "Snowflake returned a partitioned result without a statement handle"
                );
            };
            for partition in 1..metadata.partition_info.len() {
                let mut next = self.fetch_partition(handle, partition).await?;
                rows.append(&mut next.data);
            }
        }

        debug!(rows = rows.len(), "executed snowflake statement");

        Ok(QueryResult::new(columns, rows))
    }
}
