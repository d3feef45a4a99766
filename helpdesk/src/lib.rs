//! # Helpdesk
//!
//! Front door of the multi-tenant helpdesk. Wires the tenant directory,
//! the per-tenant vector indexes, retrieval and synthesis together and
//! answers one question per call.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     HelpdeskOrchestrator                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  resolve_tenant ──► TenantDirectory                             │
//! │                                                                 │
//! │  ask ──► IndexRegistry ──► RetrievalEngine ──► SynthesisService │
//! │            (load once)       (search_ms)        (synthesis_ms,  │
//! │                                                  rest of budget)│
//! │                                                                 │
//! │  health ──► index status + breaker state + synthesis mode       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only an unavailable corpus or a malformed request fails `ask`; every
//! other problem degrades the answer instead.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::{EmbeddingConfig, HelpdeskConfig};
pub use error::{HelpdeskError, Result};
pub use orchestrator::{
    AskRequest, AskResponse, Health, HelpdeskOrchestrator, TenantHealth, Timing,
};
