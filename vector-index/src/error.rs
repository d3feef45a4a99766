//! Error types for the vector index.

use thiserror::Error;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while loading or querying a corpus.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The corpus could not be loaded after all attempts.
    #[error("index unavailable for tenant {tenant_id}: {reason}")]
    Unavailable { tenant_id: String, reason: String },

    /// A query arrived before the corpus was published.
    #[error("index not loaded for tenant {0}")]
    NotLoaded(String),

    /// The blob store has no snapshot for this tenant.
    #[error("snapshot not found for tenant {0}")]
    SnapshotNotFound(String),

    /// Snapshot bytes did not parse or failed validation.
    #[error("corrupt snapshot for tenant {tenant_id}: {reason}")]
    CorruptSnapshot { tenant_id: String, reason: String },

    /// Tenant id cannot be used to address a snapshot.
    #[error("invalid tenant id: {0:?}")]
    InvalidTenant(String),

    /// Blob store request failed.
    #[error("snapshot fetch failed: {0}")]
    Fetch(String),

    /// Dimension mismatch between query and corpus.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IndexError {
    /// Whether another attempt against the same source may succeed.
    ///
    /// Missing snapshots and corrupt bytes (after the forced re-download)
    /// fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Io(_) | Self::Http(_))
    }
}
