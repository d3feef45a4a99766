//! Blob stores that hand out corpus snapshots.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{IndexError, Result};

/// Where a fetched snapshot's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Authoritative local file.
    Local,

    /// Previously downloaded copy on disk.
    Cache,

    /// Freshly downloaded from the blob store.
    Remote,
}

/// Raw snapshot bytes plus their origin.
#[derive(Debug, Clone)]
pub struct FetchedSnapshot {
    pub bytes: Vec<u8>,
    pub origin: SnapshotOrigin,
}

/// Trait for blob stores holding per-tenant snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Get the name of this source, for logs.
    fn name(&self) -> &str;

    /// Fetch the current snapshot for `tenant_id`.
    ///
    /// With `force_refresh` the source must bypass any local copy.
    async fn fetch(&self, tenant_id: &str, force_refresh: bool) -> Result<FetchedSnapshot>;
}

/// Tenant ids become file names, so path separators and dot segments are refused.
pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    let valid = !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !tenant_id.starts_with('.');
    if !valid {
        return Err(IndexError::InvalidTenant(tenant_id.to_string()));
    }
    Ok(())
}

fn snapshot_file_name(tenant_id: &str) -> Result<String> {
    validate_tenant_id(tenant_id)?;
    Ok(format!("{tenant_id}.json"))
}

/// Reads `<dir>/<tenant>.json`.
pub struct DirectorySnapshotSource {
    dir: PathBuf,
}

impl DirectorySnapshotSource {
    /// Create a source rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SnapshotSource for DirectorySnapshotSource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn fetch(&self, tenant_id: &str, _force_refresh: bool) -> Result<FetchedSnapshot> {
        let path = self.dir.join(snapshot_file_name(tenant_id)?);
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read snapshot {} ({} bytes)", path.display(), bytes.len());
                Ok(FetchedSnapshot {
                    bytes,
                    origin: SnapshotOrigin::Local,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(IndexError::SnapshotNotFound(tenant_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Downloads `<base_url>/<tenant>.json` and keeps a copy on disk.
pub struct HttpSnapshotSource {
    base_url: String,
    cache_dir: PathBuf,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSnapshotSource {
    /// Create a source downloading from `base_url` into `cache_dir`.
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the download timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn download(&self, tenant_id: &str, file_name: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{file_name}", self.base_url);
        info!("Downloading snapshot for tenant {tenant_id} from {url}");

        let response = self.client.get(&url).timeout(self.timeout).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::SnapshotNotFound(tenant_id.to_string()));
        }
        if !status.is_success() {
            return Err(IndexError::Fetch(format!("{url} returned {status}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Write via a temp file and rename so a crash never leaves half a snapshot.
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        let final_path = self.cache_dir.join(file_name);
        let tmp_path = self.cache_dir.join(format!("{file_name}.partial"));
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, tenant_id: &str, force_refresh: bool) -> Result<FetchedSnapshot> {
        let file_name = snapshot_file_name(tenant_id)?;
        let cached = self.cache_dir.join(&file_name);

        if !force_refresh {
            match fs::read(&cached).await {
                Ok(bytes) => {
                    debug!("Using cached snapshot {}", cached.display());
                    return Ok(FetchedSnapshot {
                        bytes,
                        origin: SnapshotOrigin::Cache,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let bytes = self.download(tenant_id, &file_name).await?;
        self.store(&file_name, &bytes).await?;
        Ok(FetchedSnapshot {
            bytes,
            origin: SnapshotOrigin::Remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_snapshot_file_name_rejects_traversal() {
        assert_eq!(snapshot_file_name("acme").unwrap(), "acme.json");
        assert!(snapshot_file_name("../etc/passwd").is_err());
        assert!(snapshot_file_name("a/b").is_err());
        assert!(snapshot_file_name("").is_err());
    }

    #[tokio::test]
    async fn test_directory_source_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySnapshotSource::new(dir.path());

        let err = source.fetch("acme", false).await.unwrap_err();
        assert!(matches!(err, IndexError::SnapshotNotFound(t) if t == "acme"));
    }

    #[tokio::test]
    async fn test_http_source_caches_and_force_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/corpora/acme.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/corpora/acme.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v2"))
            .mount(&server)
            .await;

        let cache = TempDir::new().unwrap();
        let source = HttpSnapshotSource::new(format!("{}/corpora/", server.uri()), cache.path());

        let first = source.fetch("acme", false).await.unwrap();
        assert_eq!(first.origin, SnapshotOrigin::Remote);
        assert_eq!(first.bytes, b"v1");

        let second = source.fetch("acme", false).await.unwrap();
        assert_eq!(second.origin, SnapshotOrigin::Cache);
        assert_eq!(second.bytes, b"v1");

        let forced = source.fetch("acme", true).await.unwrap();
        assert_eq!(forced.origin, SnapshotOrigin::Remote);
        assert_eq!(forced.bytes, b"v2");
        assert_eq!(std::fs::read(cache.path().join("acme.json")).unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_http_source_maps_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = TempDir::new().unwrap();
        let source = HttpSnapshotSource::new(server.uri(), cache.path());
        let err = source.fetch("acme", false).await.unwrap_err();
        assert!(matches!(err, IndexError::SnapshotNotFound(_)));
    }
}
