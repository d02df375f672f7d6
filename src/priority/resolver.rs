//! C1: API-key → priority-class resolver with a hot, reader-many cache.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{CoreError, CoreResult};
use crate::priority::mapping::PriorityMapping;
use crate::priority::matcher::CompiledEntry;
use crate::request::PriorityClass;
use crate::store::MappingStore;

/// Tunables for the resolver.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Number of priority classes `L`.
    pub num_priority_levels: u8,
    /// Priority returned when nothing matches (or on internal error).
    pub default_priority: PriorityClass,
    /// How long a reload result is considered fresh.
    pub cache_ttl: StdDuration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            num_priority_levels: 10,
            default_priority: 5,
            cache_ttl: StdDuration::from_secs(30),
        }
    }
}

/// C1: resolves API keys to priority classes via a cached, hot-reloadable
/// pattern table. Never fails the request path: any internal error degrades
/// to `default_priority`.
pub struct PriorityResolver {
    store: Arc<dyn MappingStore>,
    clock: SharedClock,
    config: ResolverConfig,
    // Reader-many / writer-one: readers take a cheap `Arc` clone under a
    // read lock; `reload` swaps the whole `Arc` under a write lock so no
    // reader ever observes a mixed old/new set.
    cache: RwLock<Arc<Vec<CompiledEntry>>>,
    last_reload_millis: AtomicI64,
}

impl PriorityResolver {
    pub fn new(store: Arc<dyn MappingStore>, clock: SharedClock, config: ResolverConfig) -> Self {
        Self {
            store,
            clock,
            config,
            cache: RwLock::new(Arc::new(Vec::new())),
            last_reload_millis: AtomicI64::new(0),
        }
    }

    /// Resolve `api_key` to a priority class. Attempts a reload first if the
    /// cache has gone stale; on reload failure, logs and serves the stale
    /// cache ("graceful degradation") rather than failing the request.
    pub async fn resolve(&self, api_key: &str) -> PriorityClass {
        self.maybe_reload().await;

        let cache = self.cache.read().clone();
        for entry in cache.iter() {
            if entry.matches(api_key) {
                return entry.priority;
            }
        }
        self.config.default_priority
    }

    async fn maybe_reload(&self) {
        let now_millis = self.clock.now().timestamp_millis();
        let last = self.last_reload_millis.load(Ordering::Acquire);
        let stale = now_millis.saturating_sub(last) as u64 > self.config.cache_ttl.as_millis() as u64;
        if stale {
            if let Err(err) = self.reload().await {
                tracing::warn!(error = %err, "priority mapping reload failed, serving stale cache");
            }
        }
    }

    /// Read all non-deleted, enabled rows ordered by `priority asc, id asc`,
    /// compile each pattern, and atomically swap the cached list.
    pub async fn reload(&self) -> CoreResult<()> {
        let mut rows = self.store.list().await?;
        rows.retain(|m| m.enabled && !m.audit.is_deleted());
        rows.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        let compiled: Vec<CompiledEntry> = rows.iter().filter_map(CompiledEntry::try_from_mapping).collect();

        *self.cache.write() = Arc::new(compiled);
        self.last_reload_millis
            .store(self.clock.now().timestamp_millis(), Ordering::Release);
        Ok(())
    }

    /// Validate and persist a new mapping, then reload the cache.
    pub async fn add_mapping(&self, mapping: PriorityMapping) -> CoreResult<()> {
        self.validate(&mapping)?;
        self.store.create(mapping).await?;
        self.reload().await
    }

    /// Validate and persist an updated mapping, then reload the cache.
    pub async fn update_mapping(&self, mapping: PriorityMapping) -> CoreResult<()> {
        self.validate(&mapping)?;
        self.store.update(mapping).await?;
        self.reload().await
    }

    /// Soft-delete a mapping by id, then reload the cache.
    pub async fn delete_mapping(&self, id: Uuid) -> CoreResult<()> {
        self.store.soft_delete(id, Utc::now()).await?;
        self.reload().await
    }

    /// List all live (non-deleted) mappings, for admin surfaces.
    pub async fn list_mappings(&self) -> CoreResult<Vec<PriorityMapping>> {
        self.store.list().await
    }

    fn validate(&self, mapping: &PriorityMapping) -> CoreResult<()> {
        if mapping.priority >= self.config.num_priority_levels {
            return Err(CoreError::InvalidPriority {
                priority: mapping.priority as u32,
                max: self.config.num_priority_levels as u32,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::mapping::{MatchType, TenantType};
    use crate::store::{InMemoryMappingStore, PriorityClassSeed};

    fn resolver_with(store: Arc<InMemoryMappingStore>) -> PriorityResolver {
        PriorityResolver::new(
            store,
            crate::clock::system(),
            ResolverConfig {
                num_priority_levels: 10,
                default_priority: 7,
                cache_ttl: StdDuration::from_millis(0),
            },
        )
    }

    #[tokio::test]
    async fn first_match_wins_in_priority_order() {
        let store = Arc::new(InMemoryMappingStore::new());
        let now = Utc::now();
        store.seed(
            "tok_prod*",
            MatchType::Prefix,
            PriorityClassSeed(0),
            Uuid::new_v4(),
            "prod-tenant",
            TenantType::Internal,
            now,
        );
        store.seed(
            "tok_ext_free*",
            MatchType::Prefix,
            PriorityClassSeed(9),
            Uuid::new_v4(),
            "free-tenant",
            TenantType::External,
            now,
        );

        let resolver = resolver_with(store);
        resolver.reload().await.unwrap();

        assert_eq!(resolver.resolve("tok_prodABC").await, 0);
        assert_eq!(resolver.resolve("tok_ext_free_xyz").await, 9);
        assert_eq!(resolver.resolve("tok_unknown").await, 7);
    }

    #[tokio::test]
    async fn soft_deleted_rows_never_participate() {
        let store = Arc::new(InMemoryMappingStore::new());
        let now = Utc::now();
        let id = store.seed(
            "tok_ml*",
            MatchType::Prefix,
            PriorityClassSeed(1),
            Uuid::new_v4(),
            "ml-tenant",
            TenantType::Internal,
            now,
        );

        let resolver = resolver_with(store.clone());
        resolver.reload().await.unwrap();
        assert_eq!(resolver.resolve("tok_ml_42").await, 1);

        resolver.delete_mapping(id).await.unwrap();
        assert_eq!(resolver.resolve("tok_ml_42").await, 7);
    }

    #[tokio::test]
    async fn reload_reflects_priority_change() {
        let store = Arc::new(InMemoryMappingStore::new());
        let now = Utc::now();
        let id = store.seed(
            "tok_ml*",
            MatchType::Prefix,
            PriorityClassSeed(1),
            Uuid::new_v4(),
            "ml-tenant",
            TenantType::Internal,
            now,
        );
        let resolver = resolver_with(store.clone());
        resolver.reload().await.unwrap();
        assert_eq!(resolver.resolve("tok_ml_42").await, 1);

        let mut updated = store.list().await.unwrap().into_iter().find(|m| m.id == id).unwrap();
        updated.priority = 0;
        resolver.update_mapping(updated).await.unwrap();

        assert_eq!(resolver.resolve("tok_ml_42").await, 0);
    }

    #[tokio::test]
    async fn invalid_regex_is_skipped_not_fatal() {
        let store = Arc::new(InMemoryMappingStore::new());
        let now = Utc::now();
        store.seed(
            "(unterminated",
            MatchType::Regex,
            PriorityClassSeed(0),
            Uuid::new_v4(),
            "bad-tenant",
            TenantType::Internal,
            now,
        );
        let resolver = resolver_with(store);
        // Reload must not error even though the one pattern is invalid.
        resolver.reload().await.unwrap();
        assert_eq!(resolver.resolve("anything").await, 7);
    }
}
