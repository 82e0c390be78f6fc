// src/cache/adapter.rs
use async_trait::async_trait;

/// Longest lifetime any tier stores. Larger TTLs are clamped to it.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePutOptions {
    /// Entry lifetime. `None` or zero is adapter-defined.
    pub ttl_seconds: Option<u64>,
}

impl CachePutOptions {
    pub fn ttl(seconds: u64) -> Self {
        Self {
            ttl_seconds: Some(seconds),
        }
    }

    /// TTL bounded by [`MAX_TTL_SECS`], `None` when absent or zero.
    pub fn bounded_ttl(&self) -> Option<u64> {
        self.ttl_seconds
            .filter(|ttl| *ttl > 0)
            .map(|ttl| ttl.min(MAX_TTL_SECS))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("{tier} cache write failed: {message}")]
    WriteFailed { tier: &'static str, message: String },
}

/// A single cache tier.
///
/// Implementations must not panic or propagate backend faults: a failed read
/// is reported as a miss and a failed write as `Err`.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn put(&self, key: &str, value: &str, options: CachePutOptions) -> Result<(), CacheError>;

    fn name(&self) -> &'static str;
}
