//! Per-tenant index registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::{IndexStatus, VectorIndex};
use crate::source::{SnapshotSource, validate_tenant_id};

/// Owns one [`VectorIndex`] per tenant.
///
/// Indexes are created unloaded on first request; the registry never loads
/// them itself, so each tenant keeps its own single-flight load. Ids that
/// cannot name a snapshot are refused, and an index that never loaded can
/// be released so unknown tenants do not accumulate.
pub struct IndexRegistry {
    source: Arc<dyn SnapshotSource>,
    config: IndexConfig,
    indexes: Mutex<HashMap<String, Arc<VectorIndex>>>,
}

impl IndexRegistry {
    /// Create an empty registry backed by `source`.
    pub fn new(source: Arc<dyn SnapshotSource>, config: IndexConfig) -> Self {
        Self {
            source,
            config,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Get the index for `tenant_id`, creating it if needed.
    pub fn get(&self, tenant_id: &str) -> Result<Arc<VectorIndex>> {
        validate_tenant_id(tenant_id)?;
        let mut indexes = self.indexes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(indexes.entry(tenant_id.to_string()).or_insert_with(|| {
            debug!("Registering index for tenant {tenant_id}");
            Arc::new(VectorIndex::new(
                tenant_id,
                Arc::clone(&self.source),
                self.config.clone(),
            ))
        })))
    }

    /// Forget `index` if it is still the registered one and has never
    /// loaded. Returns whether it was removed.
    pub fn release_unloaded(&self, index: &Arc<VectorIndex>) -> bool {
        let mut indexes = self.indexes.lock().unwrap_or_else(PoisonError::into_inner);
        let registered = indexes
            .get(index.tenant_id())
            .is_some_and(|current| Arc::ptr_eq(current, index));
        if !registered || index.status().loaded {
            return false;
        }
        indexes.remove(index.tenant_id());
        debug!("Released never-loaded index for tenant {}", index.tenant_id());
        true
    }

    /// Get the index for `tenant_id` only if it was already requested.
    pub fn existing(&self, tenant_id: &str) -> Option<Arc<VectorIndex>> {
        self.indexes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tenant_id)
            .cloned()
    }

    /// Status of every registered index, sorted by tenant id.
    pub fn statuses(&self) -> Vec<IndexStatus> {
        let indexes: Vec<Arc<VectorIndex>> = self
            .indexes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut statuses: Vec<IndexStatus> = indexes.iter().map(|i| i.status()).collect();
        statuses.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        statuses
    }
}
