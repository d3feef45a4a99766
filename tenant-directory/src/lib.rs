//! # Tenant Directory
//!
//! Resolves an inbound address such as `quotes+acme@zorahai.com` to the
//! tenant that owns it, in constant time once warm.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      TenantDirectory                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  normalize ──► AliasSnapshot (exact │ subuser │ domain maps) │
//! │                    │ miss                                    │
//! │                    ▼                                         │
//! │               one linear scan of the TenantStore             │
//! │                                                              │
//! │  snapshot older than TTL ──► single background rebuild,      │
//! │                              stale snapshot served meanwhile │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod snapshot;
pub mod store;

pub use config::{TenantDirectoryConfig, TenantStoreConfig};
pub use directory::{Resolution, TenantDirectory};
pub use error::{Result, TenantError};
pub use snapshot::{Address, AliasSnapshot, normalize, parse_address};
pub use store::{JsonFileTenantStore, MatchStrategy, StaticTenantStore, TenantAlias, TenantStore};
