//! Cache Module
//!
//! Provides an in-memory read-through cache with TTL expiration, LRU eviction
//! and request coalescing.

mod entry;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::CoalescingCache;
