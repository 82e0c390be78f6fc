// src/cache/mod.rs
mod adapter;
mod file_store;
mod kv;
mod manager;
mod memory;

pub use adapter::{CacheAdapter, CacheError, CachePutOptions, MAX_TTL_SECS};
pub use file_store::FileKvStore;
pub use kv::{KvBindings, KvCacheAdapter, KvError, KvStore};
pub use manager::CacheManager;
pub use memory::MemoryCacheAdapter;
