//! Configuration for corpus loading.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::source::{DirectorySnapshotSource, HttpSnapshotSource, SnapshotSource};

/// Configuration for loading a tenant corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Attempts per load before reporting the index unavailable.
    pub max_load_attempts: u32,

    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay between attempts.
    pub max_backoff_ms: u64,

    /// Expected embedding width. `None` accepts whatever the snapshot declares.
    pub expected_dimension: Option<usize>,

    /// Where snapshots come from.
    pub source: SnapshotSourceConfig,
}

impl IndexConfig {
    /// Set the number of load attempts.
    pub fn with_max_load_attempts(mut self, attempts: u32) -> Self {
        self.max_load_attempts = attempts.max(1);
        self
    }

    /// Set the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Require a specific embedding width.
    pub fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    /// Set the snapshot source.
    pub fn with_source(mut self, source: SnapshotSourceConfig) -> Self {
        self.source = source;
        self
    }

    /// Backoff before attempt number `attempt + 1`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_load_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
            expected_dimension: None,
            source: SnapshotSourceConfig::default(),
        }
    }
}

/// Blob store holding corpus snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotSourceConfig {
    /// `<path>/<tenant>.json` on the local filesystem.
    Directory { path: PathBuf },

    /// `<base_url>/<tenant>.json`, cached under `cache_dir`.
    Http {
        base_url: String,
        #[serde(default)]
        cache_dir: Option<PathBuf>,
        #[serde(default = "default_fetch_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

impl SnapshotSourceConfig {
    /// Build the configured source.
    pub fn build(&self) -> Arc<dyn SnapshotSource> {
        match self {
            Self::Directory { path } => Arc::new(DirectorySnapshotSource::new(path)),
            Self::Http {
                base_url,
                cache_dir,
                timeout_ms,
            } => {
                let cache_dir = cache_dir.clone().unwrap_or_else(default_cache_dir);
                Arc::new(
                    HttpSnapshotSource::new(base_url, cache_dir)
                        .with_timeout(Duration::from_millis(*timeout_ms)),
                )
            }
        }
    }
}

impl Default for SnapshotSourceConfig {
    fn default() -> Self {
        Self::Directory {
            path: dirs::data_dir()
                .unwrap_or_default()
                .join("helpdesk/snapshots"),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("helpdesk/snapshots")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = IndexConfig::default();
        assert_eq!(config.backoff_after(1), Duration::from_millis(500));
        assert_eq!(config.backoff_after(2), Duration::from_millis(1_000));
        assert_eq!(config.backoff_after(3), Duration::from_millis(2_000));
        assert_eq!(config.backoff_after(10), Duration::from_millis(4_000));
    }

    #[test]
    fn test_source_config_from_json() {
        let config: IndexConfig = serde_json::from_value(serde_json::json!({
            "max_load_attempts": 5,
            "source": { "kind": "http", "base_url": "https://blobs.example.com/corpora" }
        }))
        .unwrap();

        assert_eq!(config.max_load_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 500);
        assert!(matches!(
            config.source,
            SnapshotSourceConfig::Http {
                timeout_ms: 30_000,
                ..
            }
        ));
    }
}
