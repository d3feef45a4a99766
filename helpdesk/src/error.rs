//! Error types for the helpdesk front door.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for helpdesk operations.
pub type Result<T> = std::result::Result<T, HelpdeskError>;

/// Errors that reach a helpdesk caller.
///
/// Language-model and embedding failures never appear here: they degrade
/// to fallback answers and keyword retrieval.
#[derive(Error, Debug)]
pub enum HelpdeskError {
    /// The tenant's corpus could not be loaded.
    #[error("index unavailable for tenant {tenant_id}: {reason}")]
    IndexUnavailable { tenant_id: String, reason: String },

    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Tenant lookup failed before any alias snapshot existed.
    #[error("tenant directory error: {0}")]
    Tenant(#[from] helpdesk_tenant_directory::TenantError),

    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file did not parse.
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
