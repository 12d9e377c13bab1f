//! Upstream backed by JSON documents in a local directory.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{is_valid_key, Upstream, UpstreamError};

/// Serves `<data_dir>/<key>.json`.
///
/// Stands in for the remote API during local runs and tests.
#[derive(Debug, Clone)]
pub struct FileUpstream {
    data_dir: PathBuf,
}

impl FileUpstream {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl Upstream for FileUpstream {
    async fn fetch(&self, key: &str) -> Result<String, UpstreamError> {
        if !is_valid_key(key) {
            return Err(UpstreamError::InvalidKey(key.to_string()));
        }

        let path = self.data_dir.join(format!("{}.json", key));
        debug!("Upstream fetch: {}", path.display());

        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(UpstreamError::NotFound(key.to_string()))
            }
            Err(e) => return Err(UpstreamError::Transport(e.to_string())),
        };

        serde_json::from_str::<serde_json::Value>(&body)
            .map_err(|e| UpstreamError::Transport(format!("malformed document: {}", e)))?;

        Ok(body)
    }
}
