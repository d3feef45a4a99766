//! Documents and the snapshot envelope they are shipped in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use helpdesk_embeddings::Embedding;

use crate::error::{IndexError, Result};

/// One embedded passage of a tenant corpus. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier within the corpus.
    pub id: String,

    /// Passage text.
    pub text: String,

    /// Where the passage came from. May be a raw storage path.
    pub source_label: String,

    /// Human-readable title, if the producer recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Fixed-width embedding vector.
    pub embedding: Embedding,

    /// Tenant that owns this passage.
    pub tenant_scope: String,
}

/// Versioned corpus snapshot as stored in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Producer-assigned version string.
    pub version: String,

    /// Tenant the snapshot was built for.
    pub tenant_id: String,

    /// Embedding width shared by every document.
    pub dimension: usize,

    /// When the snapshot was built.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Embedded passages.
    pub documents: Vec<Document>,
}

impl Snapshot {
    /// Parse snapshot bytes and validate them for `tenant_id`.
    ///
    /// Documents scoped to a different tenant are dropped with a warning;
    /// structural problems fail the whole snapshot as corrupt.
    pub fn parse(
        bytes: &[u8],
        tenant_id: &str,
        expected_dimension: Option<usize>,
    ) -> Result<Self> {
        let corrupt = |reason: String| IndexError::CorruptSnapshot {
            tenant_id: tenant_id.to_string(),
            reason,
        };

        let mut snapshot: Snapshot =
            serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;

        if snapshot.tenant_id != tenant_id {
            return Err(corrupt(format!(
                "snapshot belongs to tenant {}",
                snapshot.tenant_id
            )));
        }

        if let Some(expected) = expected_dimension {
            if snapshot.dimension != expected {
                return Err(corrupt(format!(
                    "dimension {} does not match configured {expected}",
                    snapshot.dimension
                )));
            }
        }

        for doc in &snapshot.documents {
            if doc.id.trim().is_empty() {
                return Err(corrupt("document with empty id".to_string()));
            }
            if doc.embedding.len() != snapshot.dimension {
                return Err(corrupt(format!(
                    "document {} has {} dims, expected {}",
                    doc.id,
                    doc.embedding.len(),
                    snapshot.dimension
                )));
            }
            if doc.embedding.iter().any(|x| !x.is_finite()) {
                return Err(corrupt(format!("document {} has non-finite values", doc.id)));
            }
        }

        let before = snapshot.documents.len();
        snapshot.documents.retain(|d| d.tenant_scope == tenant_id);
        let dropped = before - snapshot.documents.len();
        if dropped > 0 {
            warn!(tenant_id, dropped, "Dropped documents scoped to another tenant");
        }

        Ok(snapshot)
    }
}
