//! Bounded, time-limited set of single-use tokens.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct NonceRecord<T> {
    value: T,
    expires_at: Instant,
}

/// Thread-safe set of tokens that expire after a TTL and can be consumed at
/// most once.
///
/// Records are kept in insertion order in a `VecDeque`; `add` and `remove`
/// are linear scans, which is fine for the handful of outstanding challenges
/// this holds.
#[derive(Debug)]
pub struct ExpiringNonceSet<T> {
    records: Mutex<VecDeque<NonceRecord<T>>>,
    max_size: usize,
    ttl: Duration,
}

impl<T: PartialEq> ExpiringNonceSet<T> {
    /// Create an empty set holding at most `max_size` records, each valid
    /// for `ttl`.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
            ttl,
        }
    }

    fn records(&self) -> MutexGuard<'_, VecDeque<NonceRecord<T>>> {
        // Recover from mutex poisoning; every mutation is a single call.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `value` with a fresh expiry.
    ///
    /// Re-adding a present value replaces its record instead of duplicating
    /// it. When the set is full the oldest record is evicted, whether or not
    /// it has expired.
    pub fn add(&self, value: T) {
        if self.max_size == 0 {
            return;
        }

        let mut records = self.records();

        if let Some(pos) = records.iter().position(|r| r.value == value) {
            records.remove(pos);
        }

        while records.len() >= self.max_size {
            records.pop_front();
        }

        records.push_back(NonceRecord {
            value,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Consume `value` if it is present and unexpired.
    ///
    /// Returns `true` at most once per `add`. Expired or unknown values return
    /// `false` and leave the set untouched.
    pub fn remove(&self, value: &T) -> bool {
        let mut records = self.records();
        let now = Instant::now();

        match records
            .iter()
            .position(|r| r.value == *value && r.expires_at > now)
        {
            Some(pos) => {
                records.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of stored records, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn set(max_size: usize) -> ExpiringNonceSet<String> {
        ExpiringNonceSet::new(max_size, Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_unknown_value() {
        let nonces = set(4);
        assert!(!nonces.remove(&"never-added".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_consumes_once() {
        let nonces = set(4);
        nonces.add("n1".to_string());

        assert!(nonces.remove(&"n1".to_string()));
        assert!(!nonces.remove(&"n1".to_string()));
        assert!(nonces.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readd_refreshes_without_duplicating() {
        let nonces = set(2);
        nonces.add("a".to_string());
        nonces.add("b".to_string());

        tokio::time::advance(Duration::from_secs(6)).await;
        nonces.add("a".to_string());
        assert_eq!(nonces.len(), 2);

        // "a" was refreshed at t=6 and outlives "b"
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!nonces.remove(&"b".to_string()));
        assert!(nonces.remove(&"a".to_string()));
        assert!(!nonces.remove(&"a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_readd_at_capacity_keeps_other_records() {
        let nonces = set(2);
        nonces.add("a".to_string());
        nonces.add("b".to_string());
        nonces.add("b".to_string());

        assert!(nonces.remove(&"a".to_string()));
        assert!(nonces.remove(&"b".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let nonces = set(3);
        for n in ["n1", "n2", "n3", "n4"] {
            nonces.add(n.to_string());
        }

        assert_eq!(nonces.len(), 3);
        assert!(!nonces.remove(&"n1".to_string()));
        assert!(nonces.remove(&"n2".to_string()));
        assert!(nonces.remove(&"n4".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_value_is_rejected_but_kept() {
        let nonces = set(4);
        nonces.add("old".to_string());
        nonces.add("other".to_string());

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!nonces.remove(&"old".to_string()));
        // Rejection does not purge anything
        assert_eq!(nonces.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_holds_nothing() {
        let nonces = set(0);
        nonces.add("n".to_string());
        assert!(nonces.is_empty());
        assert!(!nonces.remove(&"n".to_string()));
    }

    #[test]
    fn test_concurrent_remove_succeeds_once() {
        let nonces = Arc::new(ExpiringNonceSet::new(8, Duration::from_secs(60)));
        nonces.add(42u64);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let nonces = Arc::clone(&nonces);
                std::thread::spawn(move || nonces.remove(&42))
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
}
