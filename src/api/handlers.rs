//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::watch;

use crate::auth::ChallengeAuth;
use crate::config::Config;
use crate::error::{GateError, Result};
use crate::models::{HealthResponse, SettingsUpdateRequest, StatsResponse};
use crate::service::{feed_cache, FeedService};
use crate::settings::{FileStore, MemoryStore, SettingsStore};
use crate::throttle::TokenBucketThrottle;
use crate::upstream::{FileUpstream, ThrottledUpstream, Upstream};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FeedService>,
}

impl AppState {
    /// Creates a new AppState around an assembled service.
    pub fn new(service: FeedService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Wires the throttled file upstream, the document cache, the settings
    /// store and the challenge authenticator. `shutdown` cancels upstream
    /// calls still waiting for a throttle token.
    ///
    /// # Errors
    /// `GateError::Config` if the settings file cannot be loaded.
    pub fn from_config(config: &Config, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let throttle = Arc::new(TokenBucketThrottle::new(
            config.throttle_burst,
            config.throttle_refill_per_sec,
        ));
        let upstream: Arc<dyn Upstream> = Arc::new(ThrottledUpstream::new(
            FileUpstream::new(&config.upstream_data_dir),
            throttle,
            shutdown,
        ));

        let settings: Arc<dyn SettingsStore> = match &config.settings_file {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::default()),
        };

        let cache = Arc::new(feed_cache(
            config.cache_capacity,
            config.cache_ttl(),
            config.cache_failure_ttl(),
        ));
        let auth = Arc::new(ChallengeAuth::new(
            config.settings_password.clone(),
            config.nonce_capacity,
            config.nonce_ttl(),
        ));

        Ok(Self::new(FeedService::new(cache, upstream, settings, auth)))
    }
}

/// Handler for GET /feed/:key
///
/// Serves the cached upstream document for a whitelisted key.
pub async fn feed_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    let document = state.service.feed(&key).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        document.to_string(),
    )
        .into_response())
}

/// Handler for GET /settings/nonce
///
/// Issues a single-use challenge for a settings update.
pub async fn nonce_handler(State(state): State<AppState>) -> String {
    state.service.issue_challenge()
}

/// Handler for POST /settings/update
///
/// Applies new settings if the challenge response verifies.
pub async fn settings_update_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SettingsUpdateRequest>, JsonRejection>,
) -> Result<String> {
    let Json(req) = payload.map_err(|e| GateError::InvalidRequest(e.body_text()))?;

    if let Some(error_msg) = req.validate() {
        return Err(GateError::InvalidRequest(error_msg));
    }

    state.service.update_settings(&req.data, &req.hash, &req.nonce)
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.service.cache();
    Json(StatsResponse::new(&cache.stats(), cache.in_flight()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::expected_response;
    use std::time::Duration;

    fn test_state(dir: &std::path::Path, whitelist: &str) -> AppState {
        let (_tx, rx) = watch::channel(false);
        let config = Config {
            upstream_data_dir: dir.to_path_buf(),
            settings_password: "pw".to_string(),
            ..Config::default()
        };
        let state = AppState::from_config(&config, rx).unwrap();
        let nonce = state.service.issue_challenge();
        state
            .service
            .update_settings(whitelist, &expected_response(&nonce, "pw"), &nonce)
            .unwrap();
        state
    }

    #[tokio::test]
    async fn test_feed_handler_serves_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("club.json"), r#"{"ok":true}"#).unwrap();
        let state = test_state(dir.path(), "club");

        let response = feed_handler(State(state), Path("club".to_string()))
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_feed_handler_not_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "club");

        let result = feed_handler(State(state), Path("other".to_string())).await;
        assert!(matches!(result, Err(GateError::NotAllowed(_))));
    }

    #[tokio::test]
    async fn test_settings_update_handler() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "club");

        let nonce = nonce_handler(State(state.clone())).await;
        let req = SettingsUpdateRequest {
            data: "club;news".to_string(),
            hash: expected_response(&nonce, "pw"),
            nonce,
        };

        let accepted = settings_update_handler(State(state), Ok(Json(req)))
            .await
            .unwrap();
        assert_eq!(accepted, "club;news");
    }

    #[tokio::test]
    async fn test_settings_update_wrong_hash() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "club");

        let nonce = nonce_handler(State(state.clone())).await;
        let req = SettingsUpdateRequest {
            data: "news".to_string(),
            hash: expected_response(&nonce, "wrong"),
            nonce,
        };

        let result = settings_update_handler(State(state), Ok(Json(req))).await;
        assert!(matches!(result, Err(GateError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "club");

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.in_flight, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_uses_configured_nonce_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "club");

        let nonce = state.service.issue_challenge();
        tokio::time::advance(Duration::from_secs(11)).await;

        let result =
            state
                .service
                .update_settings("x", &expected_response(&nonce, "pw"), &nonce);
        assert!(matches!(result, Err(GateError::Unauthorized)));
    }
}
