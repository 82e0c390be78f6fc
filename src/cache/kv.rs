// src/cache/kv.rs
use super::adapter::{CacheAdapter, CacheError, CachePutOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),

    #[error("kv io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kv serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("kv expiration ttl out of range: {0}s")]
    InvalidTtl(u64),
}

/// Minimal contract of an external namespaced key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn put(&self, key: &str, value: &str, expiration_ttl: Option<u64>) -> Result<(), KvError>;
}

/// Named stores provided by the host environment.
#[derive(Clone, Default)]
pub struct KvBindings {
    stores: HashMap<String, Arc<dyn KvStore>>,
}

impl KvBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, name: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        self.insert(name, store);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, store: Arc<dyn KvStore>) {
        self.stores.insert(name.into(), store);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn KvStore>> {
        self.stores.get(name).cloned()
    }
}

impl fmt::Debug for KvBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvBindings")
            .field("names", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Durable tier backed by a bound [`KvStore`]. Store faults become misses on
/// read and `CacheError` on write.
pub struct KvCacheAdapter {
    binding: String,
    store: Arc<dyn KvStore>,
}

impl KvCacheAdapter {
    pub fn new(binding: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            binding: binding.into(),
            store,
        }
    }

    pub fn from_bindings(bindings: &KvBindings, binding: &str) -> Option<Self> {
        bindings.get(binding).map(|store| Self::new(binding, store))
    }
}

#[async_trait]
impl CacheAdapter for KvCacheAdapter {
    async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(binding = %self.binding, "KV read failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &str, value: &str, options: CachePutOptions) -> Result<(), CacheError> {
        self.store
            .put(key, value, options.bounded_ttl())
            .await
            .map_err(|e| CacheError::WriteFailed {
                tier: "kv",
                message: e.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "kv"
    }
}
