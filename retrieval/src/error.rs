//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
///
/// Embedding failures are absent on purpose: they degrade to keyword
/// retrieval instead of failing the request.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Index error.
    #[error("index error: {0}")]
    Index(#[from] helpdesk_vector_index::IndexError),

    /// The question was empty after trimming.
    #[error("question is empty")]
    EmptyQuestion,
}
