//! Error types for tenant resolution.

use thiserror::Error;

/// Result type alias for tenant directory operations.
pub type Result<T> = std::result::Result<T, TenantError>;

/// Errors that can occur while loading tenant aliases.
///
/// An address that matches no tenant is not an error; it resolves to a
/// [`Resolution`](crate::Resolution) with no tenant and a suggestion.
#[derive(Error, Debug)]
pub enum TenantError {
    /// The authoritative store could not be read.
    #[error("tenant store error: {0}")]
    Store(String),

    /// Alias file is not valid JSON.
    #[error("invalid alias file: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
