//! Configuration for the tenant directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::{JsonFileTenantStore, StaticTenantStore, TenantAlias, TenantStore};

/// Configuration for the tenant directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantDirectoryConfig {
    /// Age after which the alias snapshot is rebuilt in the background.
    pub ttl_secs: u64,

    /// Where alias rows come from.
    pub store: TenantStoreConfig,
}

impl TenantDirectoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for TenantDirectoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            store: TenantStoreConfig::default(),
        }
    }
}

/// Alias store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TenantStoreConfig {
    /// Rows listed inline.
    Static {
        #[serde(default)]
        aliases: Vec<TenantAlias>,
    },

    /// A JSON array of rows on disk.
    JsonFile { path: PathBuf },
}

impl TenantStoreConfig {
    /// Construct the configured store.
    pub fn build(&self) -> Arc<dyn TenantStore> {
        match self {
            Self::Static { aliases } => Arc::new(StaticTenantStore::new(aliases.clone())),
            Self::JsonFile { path } => Arc::new(JsonFileTenantStore::new(path)),
        }
    }
}

impl Default for TenantStoreConfig {
    fn default() -> Self {
        Self::Static {
            aliases: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MatchStrategy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inline_aliases_deserialize() {
        let config: TenantDirectoryConfig = serde_json::from_str(
            r#"{
                "ttl_secs": 60,
                "store": {
                    "kind": "static",
                    "aliases": [
                        {"alias": "acme@zorahai.com", "tenant_id": "acme", "strategy": "subuser-address"}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.ttl(), Duration::from_secs(60));
        let TenantStoreConfig::Static { aliases } = &config.store else {
            panic!("expected static store");
        };
        assert_eq!(aliases[0].strategy, MatchStrategy::SubuserAddress);
        assert_eq!(config.store.build().name(), "static");
    }
}
