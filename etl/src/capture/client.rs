use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::types::{ConsistencyPoint, TableName};
use crate::{bail, etl_error};

const CHANGEFEEDS_PATH: &str = "/api/v2/changefeeds";

/// A capture job to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub changefeed_id: String,
    pub sink_uri: String,
    /// Changes committed after this point are captured.
    pub start_ts: ConsistencyPoint,
    pub table: TableName,
}

/// Registers capture jobs with the change-capture service.
pub trait CaptureClient {
    /// Registers the job and returns its id.
    ///
    /// Registering a job whose id already exists succeeds and returns that id.
    fn register(&self, request: &CaptureRequest) -> impl Future<Output = EtlResult<String>> + Send;
}

#[derive(Debug, Serialize)]
struct CreateChangefeed<'a> {
    changefeed_id: &'a str,
    sink_uri: &'a str,
    start_ts: u64,
    replica_config: ReplicaConfig,
}

#[derive(Debug, Serialize)]
struct ReplicaConfig {
    filter: FilterConfig,
    sink: SinkConfig,
    enable_old_value: bool,
}

#[derive(Debug, Serialize)]
struct FilterConfig {
    rules: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SinkConfig {
    csv: CsvConfig,
    cloud_storage_config: CloudStorageConfig,
}

#[derive(Debug, Serialize)]
struct CsvConfig {
    include_commit_ts: bool,
    delimiter: &'static str,
}

#[derive(Debug, Serialize)]
struct CloudStorageConfig {
    output_column_id: bool,
}

impl<'a> CreateChangefeed<'a> {
    fn new(request: &'a CaptureRequest) -> Self {
        Self {
            changefeed_id: &request.changefeed_id,
            sink_uri: &request.sink_uri,
            start_ts: request.start_ts,
            replica_config: ReplicaConfig {
                filter: FilterConfig {
                    rules: vec![request.table.to_string()],
                },
                sink: SinkConfig {
                    csv: CsvConfig {
                        include_commit_ts: true,
                        delimiter: ",",
                    },
                    cloud_storage_config: CloudStorageConfig {
                        output_column_id: true,
                    },
                },
                enable_old_value: false,
            },
        }
    }
}

/// Client of the TiCDC open API.
#[derive(Debug, Clone)]
pub struct TiCdcClient {
    client: Client,
    api_url: String,
}

impl TiCdcClient {
    pub fn new(api_url: impl Into<String>) -> EtlResult<TiCdcClient> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                etl_error!(
                    ErrorKind::ConfigError,
                    "Failed to build the change-capture HTTP client",
                    source: err
                )
            })?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_owned(),
        })
    }
}

impl CaptureClient for TiCdcClient {
    async fn register(&self, request: &CaptureRequest) -> EtlResult<String> {
        let url = format!("{}{CHANGEFEEDS_PATH}", self.api_url);
        let body = CreateChangefeed::new(request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::CaptureConnectionFailed,
                    "Failed to reach the change-capture service",
                    format!("POST {url}"),
                    source: err
                )
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            let id = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|value| value.get("id")?.as_str().map(str::to_owned))
                .unwrap_or_else(|| request.changefeed_id.clone());
            info!(changefeed_id = %id, start_ts = request.start_ts, "registered capture job");
            return Ok(id);
        }

        if text.to_lowercase().contains("already exists") {
            info!(changefeed_id = %request.changefeed_id, "capture job is already registered");
            return Ok(request.changefeed_id.clone());
        }

        bail!(
            ErrorKind::CaptureRegistrationFailed,
            "Change-capture service rejected the capture job",
            format!("HTTP {status}: {text}")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changefeed_body() {
        let request = CaptureRequest {
            changefeed_id: "replicate-shop-orders".to_owned(),
            sink_uri: "s3://bucket/job/increment?protocol=csv".to_owned(),
            start_ts: 449_000_000_000_000_001,
            table: TableName::new("shop", "orders"),
        };

        let body = serde_json::to_value(CreateChangefeed::new(&request)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "changefeed_id": "replicate-shop-orders",
                "sink_uri": "s3://bucket/job/increment?protocol=csv",
                "start_ts": 449_000_000_000_000_001u64,
                "replica_config": {
                    "filter": {"rules": ["shop.orders"]},
                    "sink": {
                        "csv": {"include_commit_ts": true, "delimiter": ","},
                        "cloud_storage_config": {"output_column_id": true}
                    },
                    "enable_old_value": false
                }
            })
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_a_connection_error() {
        let client = TiCdcClient::new("http://127.0.0.1:1").unwrap();
        let request = CaptureRequest {
            changefeed_id: "replicate-shop-orders".to_owned(),
            sink_uri: "file:///tmp/increment".to_owned(),
            start_ts: 1,
            table: TableName::new("shop", "orders"),
        };

        let err = client.register(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CaptureConnectionFailed);
        assert!(err.is_connectivity());
    }
}
