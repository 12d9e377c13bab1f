//! Coalescing Cache Module
//!
//! Read-through cache combining HashMap storage with LRU tracking, TTL
//! expiration and per-key request coalescing.
//!
//! Concurrent misses on one key share a single producer computation: the
//! first caller registers an in-flight record and spawns the producer, later
//! callers subscribe to that record and receive the same value. The entry
//! table is guarded by a short synchronous critical section that is never
//! held across an await point.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, LruTracker};
use crate::error::{GateError, Result};

type TtlPolicy<V> = Arc<dyn Fn(&V) -> Duration + Send + Sync>;

// == Cache State ==
/// Everything protected by the cache lock.
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    lru: LruTracker<K>,
    /// At most one in-flight computation per key
    in_flight: HashMap<K, watch::Receiver<Option<V>>>,
    stats: CacheStats,
}

impl<K, V> CacheState<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            in_flight: HashMap::new(),
            stats: CacheStats::new(),
        }
    }

    /// Returns the live value for `key`, touching it for LRU purposes.
    ///
    /// An expired entry is dropped on sight and reported as absent.
    fn lookup(&mut self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                self.lru.touch(key);
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove(key);
        }
        None
    }

    fn remove(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.lru.remove(key);
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    /// Stores `value`, making room by evicting the least recently used key.
    fn store(&mut self, key: K, value: V, ttl: Duration, capacity: usize) {
        if capacity == 0 {
            return;
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= capacity {
            // Expired entries are already invisible; reclaim them before
            // evicting anything live.
            self.purge_expired();

            while self.entries.len() >= capacity {
                match self.lru.evict_oldest() {
                    Some(evicted) => {
                        self.entries.remove(&evicted);
                        self.stats.record_eviction();
                        debug!("Cache full: evicted least recently used entry");
                    }
                    None => break,
                }
            }
        }

        self.entries.insert(key.clone(), CacheEntry::new(value, ttl));
        self.lru.touch(&key);
        self.stats.set_total_entries(self.entries.len());
    }

    /// Drops the in-flight record for `key` if it still belongs to the
    /// computation that owns `rx`. A newer computation may have registered
    /// under the same key once the value was stored and turned out not live.
    fn release_in_flight(&mut self, key: &K, rx: &watch::Receiver<Option<V>>) {
        let owned = self
            .in_flight
            .get(key)
            .is_some_and(|current| current.same_channel(rx));
        if owned {
            self.in_flight.remove(key);
        }
    }

    fn purge_expired(&mut self) -> usize {
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.entries.remove(&key);
            self.lru.remove(&key);
        }

        self.stats.set_total_entries(self.entries.len());
        count
    }
}

/// Recovers the guard from a poisoned mutex.
///
/// Every mutation of the state completes before any user code runs, so a
/// panic elsewhere cannot leave it half-updated.
fn lock_state<K, V>(state: &Mutex<CacheState<K, V>>) -> MutexGuard<'_, CacheState<K, V>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// == In-Flight Guard ==
/// Removes the in-flight record for a key when the computation ends,
/// including when the producer panics. Only its own record is removed.
struct InFlightGuard<K: Eq + Hash + Clone, V: Clone> {
    state: Arc<Mutex<CacheState<K, V>>>,
    key: K,
    rx: watch::Receiver<Option<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Drop for InFlightGuard<K, V> {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        state.release_in_flight(&self.key, &self.rx);
    }
}

enum Role<V> {
    Leader(watch::Sender<Option<V>>, watch::Receiver<Option<V>>),
    Follower(watch::Receiver<Option<V>>),
}

// == Coalescing Cache ==
/// Generic read-through cache with TTL expiry, LRU eviction and request
/// coalescing.
pub struct CoalescingCache<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
    capacity: usize,
    ttl: Duration,
    ttl_policy: TtlPolicy<V>,
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a new cache holding at most `capacity` live entries, each
    /// living for `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new())),
            capacity,
            ttl,
            ttl_policy: Arc::new(move |_| ttl),
        }
    }

    /// Replaces the uniform TTL with one chosen per computed value.
    ///
    /// Used to keep failed upstream results for a different period than
    /// successful ones.
    pub fn with_ttl_policy<P>(mut self, policy: P) -> Self
    where
        P: Fn(&V) -> Duration + Send + Sync + 'static,
    {
        self.ttl_policy = Arc::new(policy);
        self
    }

    // == Get Or Compute ==
    /// Returns the live value for `key`, computing it with `producer` on a
    /// miss.
    ///
    /// At most one producer runs per key at a time; concurrent callers for
    /// the same key wait for it and observe the same value. The producer runs
    /// on its own task, so dropping any caller (including the one that
    /// started it) does not cancel the computation for the others.
    ///
    /// # Errors
    /// `GateError::Internal` if the producer panicked before yielding a value.
    pub async fn get_or_compute<F, Fut>(&self, key: K, producer: F) -> Result<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let role = {
            let mut state = lock_state(&self.state);

            if let Some(value) = state.lookup(&key) {
                state.stats.record_hit();
                return Ok(value);
            }

            let existing = state.in_flight.get(&key).cloned();
            if let Some(rx) = existing {
                state.stats.record_coalesced();
                Role::Follower(rx)
            } else {
                // Lookup and registration share this critical section, so no
                // other caller can have finished a computation in between.
                let (tx, rx) = watch::channel(None);
                state.in_flight.insert(key.clone(), rx.clone());
                state.stats.record_miss();
                Role::Leader(tx, rx)
            }
        };

        let mut rx = match role {
            Role::Leader(tx, rx) => {
                debug!("Cache miss: starting computation");
                self.spawn_computation(key, producer, tx, rx.clone());
                rx
            }
            Role::Follower(rx) => {
                debug!("Cache miss: joining in-flight computation");
                rx
            }
        };

        let outcome = rx.wait_for(Option::is_some).await;
        match outcome {
            Ok(value) => value
                .clone()
                .ok_or_else(|| GateError::Internal("computation yielded no value".to_string())),
            Err(_) => Err(GateError::Internal(
                "cache computation aborted before completion".to_string(),
            )),
        }
    }

    fn spawn_computation<F, Fut>(
        &self,
        key: K,
        producer: F,
        tx: watch::Sender<Option<V>>,
        rx: watch::Receiver<Option<V>>,
    ) where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let guard = InFlightGuard {
            state: Arc::clone(&self.state),
            key,
            rx,
        };
        let computation = producer(guard.key.clone());
        let ttl_policy = Arc::clone(&self.ttl_policy);
        let capacity = self.capacity;

        tokio::spawn(async move {
            let value = computation.await;
            let ttl = ttl_policy(&value);

            {
                let mut state = lock_state(&guard.state);
                state.store(guard.key.clone(), value.clone(), ttl, capacity);
                state.release_in_flight(&guard.key, &guard.rx);
            }
            drop(guard);

            tx.send_replace(Some(value));
        });
    }

    // == Get ==
    /// Returns the live value for `key` without computing anything.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = lock_state(&self.state);
        let value = state.lookup(key);
        if value.is_some() {
            state.stats.record_hit();
        }
        value
    }

    /// Reports whether a live entry exists, without touching its recency.
    pub fn contains_key(&self, key: &K) -> bool {
        lock_state(&self.state)
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    // == Invalidate ==
    /// Drops the entry for `key`. An in-flight computation is unaffected and
    /// will store its value when it completes.
    pub fn invalidate(&self, key: &K) -> bool {
        lock_state(&self.state).remove(key)
    }

    // == Cleanup Expired ==
    /// Physically removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        lock_state(&self.state).purge_expired()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = lock_state(&self.state);
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        stats
    }

    /// Number of computations currently outstanding.
    pub fn in_flight(&self) -> usize {
        lock_state(&self.state).in_flight.len()
    }

    /// Number of physically present entries, expired or not.
    pub fn len(&self) -> usize {
        lock_state(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K, V> fmt::Debug for CoalescingCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescingCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
