//! Authoritative alias stores.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// How an alias maps an address to a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    /// The whole address equals the tenant's support address.
    ExactSupportEmail,

    /// `anything+<tag>@<domain>` on a shared platform domain.
    SubuserAddress,

    /// Any address at a domain the tenant owns.
    CustomDomain,

    /// Nothing matched.
    None,
}

impl MatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactSupportEmail => "exact-support-email",
            Self::SubuserAddress => "subuser-address",
            Self::CustomDomain => "custom-domain",
            Self::None => "none",
        }
    }
}

/// One `(alias, tenant_id, strategy)` row.
///
/// Alias forms by strategy:
/// - exact: `support@acme-travel.com`
/// - subuser: `acme@zorahai.com` or `quotes+acme@zorahai.com` (tag `acme`)
/// - custom domain: `acme-travel.com` or `@acme-travel.com`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAlias {
    pub alias: String,
    pub tenant_id: String,
    pub strategy: MatchStrategy,
}

impl TenantAlias {
    pub fn new(
        alias: impl Into<String>,
        tenant_id: impl Into<String>,
        strategy: MatchStrategy,
    ) -> Self {
        Self {
            alias: alias.into(),
            tenant_id: tenant_id.into(),
            strategy,
        }
    }
}

/// Trait for the authoritative source of tenant aliases.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Get the name of this store, for logs.
    fn name(&self) -> &str;

    /// Load every alias row.
    async fn load_aliases(&self) -> Result<Vec<TenantAlias>>;
}

/// Aliases held in memory, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantStore {
    aliases: Vec<TenantAlias>,
}

impl StaticTenantStore {
    pub fn new(aliases: Vec<TenantAlias>) -> Self {
        Self { aliases }
    }
}

#[async_trait]
impl TenantStore for StaticTenantStore {
    fn name(&self) -> &str {
        "static"
    }

    async fn load_aliases(&self) -> Result<Vec<TenantAlias>> {
        Ok(self.aliases.clone())
    }
}

/// Reads a JSON array of alias rows on every load, so edits are picked up
/// at the next refresh.
#[derive(Debug, Clone)]
pub struct JsonFileTenantStore {
    path: PathBuf,
}

impl JsonFileTenantStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TenantStore for JsonFileTenantStore {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn load_aliases(&self) -> Result<Vec<TenantAlias>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let aliases: Vec<TenantAlias> = serde_json::from_slice(&bytes)?;
        debug!("Read {} aliases from {}", aliases.len(), self.path.display());
        Ok(aliases)
    }
}
