use config::shared::CaptureConfig;
use url::Url;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::TableName;

/// Longest changefeed id the capture service accepts.
pub const MAX_CHANGEFEED_ID_LEN: usize = 128;

/// Deterministic capture job id of `table`.
///
/// Lowercase, with runs of characters outside `[a-z0-9]` folded into one `-`.
pub fn changefeed_id(table: &TableName) -> String {
    let raw = format!("replicate-{}-{}", table.schema, table.name).to_lowercase();

    let mut id = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            id.push(c);
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    id.truncate(MAX_CHANGEFEED_ID_LEN);

    id.trim_matches('-').to_owned()
}

/// Builds the sink URI of a capture job writing CSV change files to `location`.
///
/// Credentials for the location are read from the environment.
pub fn build_sink_uri(location: &str, capture: &CaptureConfig) -> EtlResult<String> {
    build_sink_uri_with(location, capture, |key| std::env::var(key).ok())
}

fn build_sink_uri_with(
    location: &str,
    capture: &CaptureConfig,
    env: impl Fn(&str) -> Option<String>,
) -> EtlResult<String> {
    let mut url = Url::parse(location)?;
    let flush_interval = capture.flush_interval().as_secs().max(1);

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("flush-interval", &format!("{flush_interval}s"))
            .append_pair("file-size", &capture.file_size.to_string())
            .append_pair("protocol", "csv");

        match url_scheme(location) {
            "s3" => {
                for (key, variable) in [
                    ("access-key", "AWS_ACCESS_KEY_ID"),
                    ("secret-access-key", "AWS_SECRET_ACCESS_KEY"),
                    ("session-token", "AWS_SESSION_TOKEN"),
                ] {
                    if let Some(value) = env(variable) {
                        query.append_pair(key, &value);
                    }
                }
            }
            "gs" | "gcs" => {
                if let Some(path) = env("GOOGLE_APPLICATION_CREDENTIALS") {
                    query.append_pair("credentials-file", &path);
                }
            }
            "file" | "memory" => {}
            other => bail!(
                ErrorKind::ConfigError,
                "Unsupported change-capture sink",
                format!("scheme `{other}` of `{location}`")
            ),
        }
    }

    Ok(url.into())
}

fn url_scheme(location: &str) -> &str {
    location.split_once("://").map_or("", |(scheme, _)| scheme)
}
