// src/cache/memory.rs
use super::adapter::{CacheAdapter, CacheError, CachePutOptions};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local tier. Expired entries are evicted when read, there is no
/// background sweep. A put without a positive TTL deletes the key.
#[derive(Debug, Default)]
pub struct MemoryCacheAdapter {
    entries: DashMap<String, Entry>,
}

impl MemoryCacheAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheAdapter for MemoryCacheAdapter {
    async fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            None => return None,
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => {}
        }

        self.entries
            .remove_if(key, |_, entry| Instant::now() >= entry.expires_at);
        None
    }

    async fn put(&self, key: &str, value: &str, options: CachePutOptions) -> Result<(), CacheError> {
        let Some(ttl) = options.bounded_ttl() else {
            self.entries.remove(key);
            return Ok(());
        };

        let expires_at = Instant::now()
            .checked_add(Duration::from_secs(ttl))
            .ok_or_else(|| CacheError::WriteFailed {
                tier: self.name(),
                message: format!("ttl of {}s is out of range", ttl),
            })?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
