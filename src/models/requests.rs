//! Request DTOs for the gateway API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for a settings update (POST /settings/update)
///
/// # Fields
/// - `data`: New settings value; empty to read the current value back
/// - `hash`: `hex(sha256(nonce + secret + nonce))`
/// - `nonce`: Challenge previously issued by GET /settings/nonce
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdateRequest {
    #[serde(default)]
    pub data: String,
    pub hash: String,
    pub nonce: String,
}

impl SettingsUpdateRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.nonce.is_empty() {
            return Some("Nonce cannot be empty".to_string());
        }
        if self.hash.is_empty() {
            return Some("Hash cannot be empty".to_string());
        }
        None
    }
}
