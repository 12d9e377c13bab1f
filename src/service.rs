//! Feed Service
//!
//! Glue between the HTTP layer and the core primitives: whitelist check,
//! cached upstream reads, and authenticated settings updates.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::ChallengeAuth;
use crate::cache::{CacheStats, CoalescingCache};
use crate::error::{GateError, Result};
use crate::settings::{whitelist_contains, SettingsStore};
use crate::upstream::{Upstream, UpstreamError};

/// Cached result of one upstream fetch. Failures are cached too.
pub type FetchOutcome = std::result::Result<Arc<str>, UpstreamError>;

/// Cache type used for upstream documents.
pub type FeedCache = CoalescingCache<String, FetchOutcome>;

/// Builds the document cache, keeping failures for `failure_ttl` and
/// successes for `ttl`.
pub fn feed_cache(capacity: usize, ttl: Duration, failure_ttl: Duration) -> FeedCache {
    CoalescingCache::new(capacity, ttl).with_ttl_policy(move |outcome: &FetchOutcome| {
        if outcome.is_ok() {
            ttl
        } else {
            failure_ttl
        }
    })
}

// == Feed Service ==
pub struct FeedService {
    cache: Arc<FeedCache>,
    upstream: Arc<dyn Upstream>,
    settings: Arc<dyn SettingsStore>,
    auth: Arc<ChallengeAuth>,
}

impl FeedService {
    pub fn new(
        cache: Arc<FeedCache>,
        upstream: Arc<dyn Upstream>,
        settings: Arc<dyn SettingsStore>,
        auth: Arc<ChallengeAuth>,
    ) -> Self {
        Self {
            cache,
            upstream,
            settings,
            auth,
        }
    }

    // == Feed ==
    /// Returns the upstream document for a whitelisted `key`.
    ///
    /// # Errors
    /// - `NotAllowed` if `key` is not in the settings whitelist
    /// - the mapped `UpstreamError` if the (possibly cached) fetch failed
    pub async fn feed(&self, key: &str) -> Result<Arc<str>> {
        if !whitelist_contains(&self.settings.get(), key) {
            debug!("Rejected feed request for non-whitelisted key '{}'", key);
            return Err(GateError::NotAllowed(key.to_string()));
        }

        let upstream = Arc::clone(&self.upstream);
        let outcome = self
            .cache
            .get_or_compute(key.to_string(), move |key| async move {
                upstream.fetch(&key).await.map(Arc::<str>::from)
            })
            .await?;

        outcome.map_err(|err| {
            warn!("Feed '{}' unavailable: {}", key, err);
            GateError::from(err)
        })
    }

    // == Settings ==
    /// Issues a nonce for a subsequent settings update.
    pub fn issue_challenge(&self) -> String {
        self.auth.generate_challenge()
    }

    /// Applies `data` as the new settings after verifying `hash` for `nonce`.
    ///
    /// An empty `data` leaves the settings unchanged and returns the current
    /// value, which lets an authenticated client read them back.
    pub fn update_settings(&self, data: &str, hash: &str, nonce: &str) -> Result<String> {
        if !self.auth.verify_response(hash, nonce) {
            return Err(GateError::Unauthorized);
        }

        if data.is_empty() {
            return Ok(self.settings.get());
        }

        self.settings.put(data)?;
        info!("Settings updated ({} bytes)", data.len());
        Ok(data.to_string())
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
