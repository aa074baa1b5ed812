//! 缓存与存储层

pub mod cache;
pub mod store;

pub use cache::{cache_key, CacheManager, CacheOptions, CacheStats, TierStats};
pub use store::{DocumentStore, MemoryStore, RedbStore};
