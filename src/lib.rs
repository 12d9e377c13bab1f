//! Feedgate - a caching, throttling gateway in front of a rate-limited upstream
//!
//! Serves whitelisted upstream documents through a coalescing TTL/LRU cache,
//! paces upstream calls with a token bucket, and guards settings updates with
//! a single-use challenge-response handshake.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod settings;
pub mod tasks;
pub mod throttle;
pub mod upstream;

pub use api::AppState;
pub use auth::{ChallengeAuth, ExpiringNonceSet};
pub use cache::CoalescingCache;
pub use config::Config;
pub use error::{GateError, Result};
pub use service::FeedService;
pub use tasks::spawn_cleanup_task;
pub use throttle::{Cancelled, TokenBucketThrottle};
