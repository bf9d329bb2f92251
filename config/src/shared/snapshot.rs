use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the snapshot extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    /// Number of extraction threads.
    #[serde(default = "default_concurrency")]
    pub concurrency: u16,
    /// Path or name of the `dumpling` executable.
    #[serde(default = "default_extractor_path")]
    pub extractor_path: String,
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::InvalidConfig(
                "`snapshot.concurrency` must be greater than zero".to_owned(),
            ));
        }
        if self.extractor_path.is_empty() {
            return Err(ValidationError::MissingField("snapshot.extractor_path"));
        }

        Ok(())
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            extractor_path: default_extractor_path(),
        }
    }
}

fn default_concurrency() -> u16 {
    8
}

fn default_extractor_path() -> String {
    "dumpling".to_owned()
}
