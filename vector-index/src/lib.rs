//! # Vector Index
//!
//! This crate holds each tenant's embedded document corpus in memory and
//! answers nearest-neighbor queries against it.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         VectorIndex                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  new ──► ensure_loaded ──► search / keyword_search              │
//! │              │                    ▲                             │
//! │              ▼                    │                             │
//! │  SnapshotSource ──► Snapshot ──► CorpusIndex ◄── refresh        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `VectorIndex` is constructed unloaded and cheap. The first call to
//! [`VectorIndex::ensure_loaded`] downloads and publishes the corpus while
//! every concurrent caller waits on the same load. Once published, reads
//! clone an `Arc` to the immutable [`CorpusIndex`] and never wait on a
//! load. [`VectorIndex::refresh`] builds a replacement corpus and swaps it
//! in; queries holding the previous `Arc` finish against the old corpus.

pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod registry;
pub mod source;

pub use config::{IndexConfig, SnapshotSourceConfig};
pub use document::{Document, Snapshot};
pub use error::{IndexError, Result};
pub use index::{CorpusIndex, IndexStatus, Neighbor, VectorIndex};
pub use registry::IndexRegistry;
pub use source::{
    DirectorySnapshotSource, FetchedSnapshot, HttpSnapshotSource, SnapshotOrigin, SnapshotSource,
    validate_tenant_id,
};
