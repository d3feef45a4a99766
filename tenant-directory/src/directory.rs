//! The TTL-cached tenant directory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::snapshot::{AliasSnapshot, normalize, parse_address, row_matches};
use crate::store::{MatchStrategy, TenantStore};

/// Outcome of resolving one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub found: bool,
    pub tenant_id: Option<String>,
    pub strategy: MatchStrategy,

    /// Whether the answer came from the cached map rather than a store scan.
    pub cache_hit: bool,

    pub elapsed_ms: u64,

    /// Hint for operators when nothing matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Maps inbound addresses to tenants from a periodically rebuilt snapshot.
///
/// Readers never wait on a refresh once a first snapshot exists: a stale
/// snapshot is served while one background task rebuilds it. Cheap to clone.
#[derive(Clone)]
pub struct TenantDirectory {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TenantStore>,
    ttl: Duration,
    current: RwLock<Option<Arc<AliasSnapshot>>>,
    refresh_lock: Arc<Mutex<()>>,
    next_generation: AtomicU64,
}

impl TenantDirectory {
    /// Create an empty directory. The first `resolve` builds the snapshot.
    pub fn new(store: Arc<dyn TenantStore>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                ttl,
                current: RwLock::new(None),
                refresh_lock: Arc::new(Mutex::new(())),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Generation of the published snapshot, 0 before the first build.
    pub fn generation(&self) -> u64 {
        self.inner.current().map_or(0, |s| s.generation())
    }

    /// Aliases in the published snapshot.
    pub fn alias_count(&self) -> usize {
        self.inner.current().map_or(0, |s| s.len())
    }

    /// Rebuild the snapshot now, waiting for any refresh in progress.
    pub async fn refresh(&self) -> Result<u64> {
        let _guard = self.inner.refresh_lock.lock().await;
        let snapshot = self.inner.rebuild().await?;
        Ok(snapshot.generation())
    }

    /// Resolve an address-like string to a tenant.
    ///
    /// Errors only when no snapshot exists yet and the store cannot be read.
    pub async fn resolve(&self, address: &str) -> Result<Resolution> {
        let started = Instant::now();
        let normalized = normalize(address);
        let snapshot = self.snapshot().await?;

        if let Some((tenant, strategy)) = snapshot.lookup(&normalized) {
            debug!(address = %normalized, tenant_id = tenant, "Resolved from cache");
            return Ok(Resolution {
                found: true,
                tenant_id: Some(tenant.to_string()),
                strategy,
                cache_hit: true,
                elapsed_ms: elapsed_ms(started),
                suggestion: None,
            });
        }

        Ok(self.scan(&normalized, started).await)
    }

    /// Published snapshot, building it on first use and scheduling a
    /// background rebuild once it is older than the TTL.
    async fn snapshot(&self) -> Result<Arc<AliasSnapshot>> {
        if let Some(snapshot) = self.inner.current() {
            if snapshot.built_at().elapsed() >= self.inner.ttl {
                self.spawn_refresh();
            }
            return Ok(snapshot);
        }

        let _guard = self.inner.refresh_lock.lock().await;
        if let Some(snapshot) = self.inner.current() {
            return Ok(snapshot);
        }
        self.inner.rebuild().await
    }

    fn spawn_refresh(&self) {
        let Ok(guard) = Arc::clone(&self.inner.refresh_lock).try_lock_owned() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = guard;
            // Another caller may have finished a refresh before we got the lock.
            let fresh = inner
                .current()
                .is_some_and(|s| s.built_at().elapsed() < inner.ttl);
            if fresh {
                return;
            }
            if let Err(e) = inner.rebuild().await {
                warn!("Tenant directory refresh failed, serving previous snapshot: {e}");
            }
        });
    }

    /// One linear pass over a fresh store read, in strategy priority order.
    async fn scan(&self, normalized: &str, started: Instant) -> Resolution {
        let rows = match self.inner.store.load_aliases().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(address = %normalized, "Tenant store scan failed: {e}");
                return not_found(started, format!("tenant store unavailable: {e}"));
            }
        };

        let address = parse_address(normalized);
        for strategy in [
            MatchStrategy::ExactSupportEmail,
            MatchStrategy::SubuserAddress,
            MatchStrategy::CustomDomain,
        ] {
            let hit = rows
                .iter()
                .filter(|row| row.strategy == strategy)
                .find(|row| row_matches(row, normalized, address.as_ref()));
            if let Some(row) = hit {
                debug!(
                    address = %normalized,
                    tenant_id = %row.tenant_id,
                    "Resolved by store scan"
                );
                return Resolution {
                    found: true,
                    tenant_id: Some(row.tenant_id.trim().to_string()),
                    strategy,
                    cache_hit: false,
                    elapsed_ms: elapsed_ms(started),
                    suggestion: None,
                };
            }
        }

        let suggestion = match &address {
            None => format!("'{normalized}' is not an email address"),
            Some(a) if a.tag.is_some() => format!(
                "no tenant has subuser tag '{}' or custom domain '{}'",
                a.tag.unwrap_or_default(),
                a.domain
            ),
            Some(a) => format!(
                "no tenant uses '{normalized}' as a support address or '{}' as a custom domain",
                a.domain
            ),
        };
        not_found(started, suggestion)
    }
}

impl Inner {
    fn current(&self) -> Option<Arc<AliasSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Caller must hold `refresh_lock`.
    async fn rebuild(&self) -> Result<Arc<AliasSnapshot>> {
        let rows = self.store.load_aliases().await?;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(AliasSnapshot::build(generation, &rows));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        info!(
            generation,
            aliases = snapshot.len(),
            store = self.store.name(),
            "Published tenant directory snapshot"
        );
        Ok(snapshot)
    }
}

fn not_found(started: Instant, suggestion: String) -> Resolution {
    Resolution {
        found: false,
        tenant_id: None,
        strategy: MatchStrategy::None,
        cache_hit: false,
        elapsed_ms: elapsed_ms(started),
        suggestion: Some(suggestion),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
