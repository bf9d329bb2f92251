use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Settings of the change-capture service and of the change files it writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How often the capture service flushes change files to the workspace.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Maximum size in bytes of a single change file.
    #[serde(default = "default_file_size")]
    pub file_size: u64,
    /// Sink of a capture job created outside of the replicator.
    ///
    /// When set, registration is skipped and change files are read from the workspace directly.
    #[serde(default)]
    pub sink_uri: Option<String>,
}

impl CaptureConfig {
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Interval between two scans of the change files.
    pub fn poll_interval(&self) -> Duration {
        self.flush_interval() / 5
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.flush_interval_ms == 0 {
            return Err(ValidationError::InvalidConfig(
                "`capture.flush_interval_ms` must be greater than zero".to_owned(),
            ));
        }
        if self.file_size == 0 {
            return Err(ValidationError::InvalidConfig(
                "`capture.file_size` must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            flush_interval_ms: default_flush_interval_ms(),
            file_size: default_file_size(),
            sink_uri: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8300
}

fn default_flush_interval_ms() -> u64 {
    60_000
}

fn default_file_size() -> u64 {
    64 * 1024 * 1024
}
