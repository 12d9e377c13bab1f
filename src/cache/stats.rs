//! Cache Statistics Module
//!
//! Counters describing how lookups were answered: from a live entry, by
//! starting a computation, or by joining one already running.

use serde::Serialize;

// == Cache Stats ==
/// Lookup outcome counters plus eviction and size bookkeeping.
///
/// Every lookup lands in exactly one of `hits`, `misses` or `coalesced`, so
/// `misses` is also the number of producer computations started.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a live entry
    pub hits: u64,
    /// Lookups that started a producer computation
    pub misses: u64,
    /// Lookups that joined a computation already in flight
    pub coalesced: u64,
    /// Live entries dropped to make room
    pub evictions: u64,
    /// Physically present entries, expired or not
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total lookups observed.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses + self.coalesced
    }

    /// Share of lookups answered without waiting on a producer.
    ///
    /// A coalesced caller still waited for the upstream, so it is not a hit.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.lookups())
    }

    /// Share of non-hit lookups that piggybacked on a running computation
    /// instead of starting their own.
    pub fn coalesce_rate(&self) -> f64 {
        ratio(self.coalesced, self.misses + self.coalesced)
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_coalesced(&mut self) {
        self.coalesced += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
