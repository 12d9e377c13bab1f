//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the coalescing cache against a reference LRU model
//! and to verify producer invocation counts.

use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CoalescingCache;

// == Test Configuration ==
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Keys from a small alphabet so that operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Compute { key: String },
    Peek { key: String },
    Invalidate { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => key_strategy().prop_map(|key| CacheOp::Compute { key }),
        2 => key_strategy().prop_map(|key| CacheOp::Peek { key }),
        1 => key_strategy().prop_map(|key| CacheOp::Invalidate { key }),
    ]
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

// == Reference Model ==
/// Plain LRU list: front = most recently used.
#[derive(Default)]
struct LruModel {
    order: VecDeque<String>,
}

impl LruModel {
    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_front(key.to_string());
    }

    fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }

    /// Returns true when the key was absent (a producer call is expected).
    fn compute(&mut self, key: &str, capacity: usize) -> bool {
        if self.contains(key) {
            self.touch(key);
            return false;
        }
        if self.order.len() >= capacity {
            self.order.pop_back();
        }
        self.touch(key);
        true
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Every sequence of operations leaves the cache holding exactly the keys
    // a reference LRU list would hold, and the producer runs once per miss.
    #[test]
    fn prop_matches_lru_model(
        ops in prop::collection::vec(cache_op_strategy(), 1..60),
        capacity in 1usize..5,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cache = CoalescingCache::new(capacity, TEST_TTL);
            let calls = Arc::new(AtomicUsize::new(0));
            let mut model = LruModel::default();
            let mut expected_calls = 0usize;

            for op in ops {
                match op {
                    CacheOp::Compute { key } => {
                        if model.compute(&key, capacity) {
                            expected_calls += 1;
                        }
                        let calls = Arc::clone(&calls);
                        let value = cache
                            .get_or_compute(key.clone(), move |k| async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                format!("v-{}", k)
                            })
                            .await
                            .unwrap();
                        prop_assert_eq!(value, format!("v-{}", key));
                    }
                    CacheOp::Peek { key } => {
                        let found = cache.get(&key).is_some();
                        prop_assert_eq!(found, model.contains(&key));
                        if found {
                            model.touch(&key);
                        }
                    }
                    CacheOp::Invalidate { key } => {
                        let removed = cache.invalidate(&key);
                        prop_assert_eq!(removed, model.contains(&key));
                        model.order.retain(|k| k != &key);
                    }
                }

                prop_assert!(cache.len() <= capacity, "Cache size {} exceeds {}", cache.len(), capacity);
                for key in ["a", "b", "c", "d", "e", "f"] {
                    let key = key.to_string();
                    prop_assert_eq!(cache.contains_key(&key), model.contains(&key), "key {}", key);
                }
            }

            prop_assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
            prop_assert_eq!(cache.stats().misses as usize, expected_calls);
            Ok(())
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    // Under true parallelism, each key is computed exactly once and every
    // caller sees that key's value.
    #[test]
    fn prop_concurrent_callers_share_one_computation(
        keys in prop::collection::vec(key_strategy(), 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let cache = Arc::new(CoalescingCache::new(16, TEST_TTL));
            let calls: Arc<HashMap<String, AtomicUsize>> = Arc::new(
                ["a", "b", "c", "d", "e", "f"]
                    .iter()
                    .map(|k| (k.to_string(), AtomicUsize::new(0)))
                    .collect(),
            );

            let mut handles = Vec::new();
            for key in keys.iter().cloned() {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                handles.push(tokio::spawn(async move {
                    cache
                        .get_or_compute(key.clone(), move |k| async move {
                            calls[&k].fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            k.to_uppercase()
                        })
                        .await
                        .map(|value| (key, value))
                }));
            }

            for handle in handles {
                let (key, value) = handle.await.unwrap().unwrap();
                prop_assert_eq!(value, key.to_uppercase());
            }

            for key in keys.iter() {
                prop_assert_eq!(calls[key].load(Ordering::SeqCst), 1, "key {}", key);
            }
            Ok(())
        })?;
    }
}
