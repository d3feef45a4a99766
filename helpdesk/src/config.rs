//! Aggregate configuration loaded from one TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use helpdesk_retrieval::RetrievalConfig;
use helpdesk_synthesis::{BreakerConfig, LlmConfig, SynthesisConfig};
use helpdesk_tenant_directory::TenantDirectoryConfig;
use helpdesk_vector_index::IndexConfig;

use crate::error::{HelpdeskError, Result};

/// Everything the helpdesk needs to start. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpdeskConfig {
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
    pub breaker: BreakerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub tenants: TenantDirectoryConfig,
}

impl HelpdeskConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| HelpdeskError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// `<config dir>/helpdesk/config.toml`, e.g. `~/.config/helpdesk/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("helpdesk").join("config.toml"))
    }

    /// Load the default file if it exists, otherwise the built-in defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }
}

/// Query embedding endpoint. The key is read from `api_key_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,

    /// Must match the width of the tenant snapshots.
    pub dimension: usize,

    pub api_key_env: String,
    pub timeout_ms: u64,

    /// Query embeddings kept per process.
    pub cache_entries: usize,
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: helpdesk_embeddings::DEFAULT_DIMENSION,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 1_500,
            cache_entries: 1_024,
        }
    }
}
