// src/cache/manager.rs
use super::adapter::{CacheAdapter, CachePutOptions};
use super::kv::{KvBindings, KvCacheAdapter};
use super::memory::MemoryCacheAdapter;
use crate::config::{CacheTier, ProxySettings};
use crate::tasks::BackgroundTasks;
use dashmap::DashSet;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Priority-ordered cache tiers behaving as one logical cache.
///
/// Reads stop at the first tier holding a value and backfill the faster
/// tiers in the background. Writes fan out to every tier; a tier whose write
/// fails is skipped by later writes through the same manager.
#[derive(Clone)]
pub struct CacheManager {
    adapters: Vec<Arc<dyn CacheAdapter>>,
    tasks: BackgroundTasks,
    deselected: Arc<DashSet<usize>>,
}

impl CacheManager {
    pub fn new(adapters: Vec<Arc<dyn CacheAdapter>>, tasks: BackgroundTasks) -> Self {
        Self {
            adapters,
            tasks,
            deselected: Arc::new(DashSet::new()),
        }
    }

    /// Resolve the tiers selected in `settings`. Returns `None` when no tier
    /// is usable, which disables caching for the request.
    pub fn from_settings(
        settings: &ProxySettings,
        memory: &Arc<MemoryCacheAdapter>,
        bindings: &KvBindings,
        tasks: BackgroundTasks,
    ) -> Option<Self> {
        let mut adapters: Vec<Arc<dyn CacheAdapter>> = Vec::new();
        for tier in settings.cache_tiers() {
            match tier {
                CacheTier::Memory => adapters.push(memory.clone()),
                CacheTier::Kv => {
                    let binding = settings.kv_binding();
                    match KvCacheAdapter::from_bindings(bindings, &binding) {
                        Some(adapter) => adapters.push(Arc::new(adapter)),
                        None => debug!("KV binding {} not present, skipping durable tier", binding),
                    }
                }
            }
        }

        if adapters.is_empty() {
            None
        } else {
            Some(Self::new(adapters, tasks))
        }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub async fn get(&self, key: &str, backfill: CachePutOptions) -> Option<String> {
        for (index, adapter) in self.adapters.iter().enumerate() {
            let Some(value) = adapter.get(key).await else {
                continue;
            };

            debug!(tier = adapter.name(), "Cache hit for {}", key);
            for earlier in &self.adapters[..index] {
                let earlier = earlier.clone();
                let key = key.to_string();
                let value = value.clone();
                self.tasks.spawn(async move {
                    if let Err(e) = earlier.put(&key, &value, backfill).await {
                        debug!(tier = earlier.name(), "Cache backfill failed: {}", e);
                    }
                });
            }
            return Some(value);
        }
        None
    }

    /// Write to every selected tier concurrently. Individual failures are
    /// logged and never reach the caller.
    pub async fn put(&self, key: &str, value: &str, options: CachePutOptions) {
        let writes = self
            .adapters
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.deselected.contains(index))
            .map(|(index, adapter)| async move { (index, adapter.put(key, value, options).await) });

        for (index, result) in join_all(writes).await {
            if let Err(e) = result {
                warn!(tier = self.adapters[index].name(), "Cache write failed: {}", e);
                self.deselected.insert(index);
            }
        }
    }

    /// Fire-and-forget [`CacheManager::put`] tracked by the task registry.
    pub fn put_detached(&self, key: &str, value: &str, options: CachePutOptions) {
        let manager = self.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.tasks.spawn(async move {
            manager.put(&key, &value, options).await;
        });
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("tiers", &self.tier_names())
            .finish()
    }
}
