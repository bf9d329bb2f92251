//! Object-storage workspace shared by snapshot files, change files and markers.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;
use url::Url;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Environment variable prefixes forwarded to the object-store builders.
const CREDENTIAL_ENV_PREFIXES: &[&str] = &["AWS_", "GOOGLE_"];

/// A location in object storage that every path of a replication job is relative to.
///
/// Clones share the underlying store.
#[derive(Clone)]
pub struct Workspace {
    url: String,
    store: Arc<dyn ObjectStore>,
    root: Path,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Workspace<{}>", self.url)
    }
}

impl Workspace {
    /// Opens the workspace at `uri` (`s3://`, `gs://`, `gcs://`, `file://` or `memory://`).
    ///
    /// Credentials are read from the `AWS_*` and `GOOGLE_*` environment variables.
    pub fn open(uri: &str) -> EtlResult<Workspace> {
        let url = Url::parse(uri)?;
        let options = std::env::vars().filter_map(|(key, value)| {
            CREDENTIAL_ENV_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix))
                .then(|| (key.to_lowercase(), value))
        });

        let (store, root) = match url.scheme() {
            "s3" | "gs" | "file" | "memory" => object_store::parse_url_opts(&url, options)?,
            "gcs" => {
                let mut gs = url.clone();
                if gs.set_scheme("gs").is_err() {
                    bail!(ErrorKind::ConfigError, "Invalid GCS workspace URI", uri);
                }
                object_store::parse_url_opts(&gs, options)?
            }
            other => bail!(
                ErrorKind::ConfigError,
                "Unsupported workspace scheme",
                format!("`{other}` in `{uri}`")
            ),
        };

        debug!(workspace = uri, "opened workspace");

        Ok(Self::from_store(uri, Arc::from(store), root))
    }

    /// Wraps an existing store. `root` is the prefix every workspace path is resolved under.
    pub fn from_store(url: &str, store: Arc<dyn ObjectStore>, root: Path) -> Workspace {
        Self {
            url: url.strip_suffix('/').unwrap_or(url).to_owned(),
            store,
            root,
        }
    }

    /// A fresh in-memory workspace.
    pub fn in_memory() -> Workspace {
        Self::from_store("memory:///", Arc::new(InMemory::new()), Path::default())
    }

    /// URI of the workspace root.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URI of `relative` inside the workspace.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.url, relative.trim_start_matches('/'))
    }

    /// Scheme of the workspace URI.
    pub fn scheme(&self) -> &str {
        self.url.split_once("://").map_or("", |(scheme, _)| scheme)
    }

    fn qualify(&self, relative: &str) -> Path {
        self.root
            .parts()
            .chain(Path::from(relative).parts())
            .collect()
    }

    pub async fn put(&self, relative: &str, bytes: impl Into<Bytes>) -> EtlResult<()> {
        let path = self.qualify(relative);
        self.store
            .put(&path, PutPayload::from(bytes.into()))
            .await?;

        Ok(())
    }

    pub async fn get(&self, relative: &str) -> EtlResult<Bytes> {
        let path = self.qualify(relative);
        let bytes = self.store.get(&path).await?.bytes().await?;

        Ok(bytes)
    }

    /// Returns `true` when an object exists at `relative`.
    pub async fn exists(&self, relative: &str) -> EtlResult<bool> {
        match self.store.head(&self.qualify(relative)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Lists every object under `prefix`, recursively.
    ///
    /// Returned paths are relative to the workspace root and sorted.
    pub async fn list(&self, prefix: &str) -> EtlResult<Vec<String>> {
        let prefix = self.qualify(prefix);
        let root_parts = self.root.parts().count();

        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;
        let mut paths: Vec<String> = objects
            .into_iter()
            .map(|object| {
                let relative: Path = object.location.parts().skip(root_parts).collect();
                relative.to_string()
            })
            .collect();
        paths.sort();

        Ok(paths)
    }
}
