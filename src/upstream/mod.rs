//! Upstream Module
//!
//! The scarce data source behind the cache, and the throttle that guards it.

mod file;
mod throttled;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::GateError;

pub use file::FileUpstream;
pub use throttled::ThrottledUpstream;

// == Upstream Error ==
/// Failure of a single upstream fetch.
///
/// `Clone` so that failures can be cached alongside successes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("no upstream document for '{0}'")]
    NotFound(String),

    #[error("invalid upstream key '{0}'")]
    InvalidKey(String),

    #[error("upstream transport failure: {0}")]
    Transport(String),

    #[error("upstream call cancelled")]
    Cancelled,
}

impl From<UpstreamError> for GateError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound(key) => GateError::NotFound(key),
            UpstreamError::InvalidKey(key) => {
                GateError::InvalidRequest(format!("invalid key '{}'", key))
            }
            other => GateError::Upstream(other.to_string()),
        }
    }
}

// == Upstream Trait ==
/// Source of raw documents, keyed by name.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetches the current document for `key`.
    async fn fetch(&self, key: &str) -> Result<String, UpstreamError>;
}

/// Accepts `[A-Za-z0-9_.-]` keys that do not start with a dot.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
