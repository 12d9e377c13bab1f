//! One-time challenge-response verification against a shared secret.
//!
//! The client fetches a nonce, then proves knowledge of the secret by sending
//! `hex(sha256(nonce + secret + nonce))`. Each nonce is consumed by the first
//! verification attempt, whatever its outcome.

use std::time::Duration;

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::ExpiringNonceSet;

/// Random bytes per nonce (hex-encoded to twice as many characters).
pub const NONCE_BYTES: usize = 16;

/// Challenge-response authenticator.
///
/// An empty secret disables verification entirely.
pub struct ChallengeAuth {
    secret: String,
    nonces: ExpiringNonceSet<String>,
}

impl ChallengeAuth {
    /// Create an authenticator keeping at most `nonce_capacity` outstanding
    /// challenges, each valid for `nonce_ttl`.
    pub fn new(secret: impl Into<String>, nonce_capacity: usize, nonce_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            nonces: ExpiringNonceSet::new(nonce_capacity, nonce_ttl),
        }
    }

    /// Whether a non-empty secret is configured.
    pub fn is_enabled(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Issue a fresh random nonce and remember it for one verification.
    pub fn generate_challenge(&self) -> String {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);

        self.nonces.add(nonce.clone());
        debug!(outstanding = self.nonces.len(), "Issued settings challenge");
        nonce
    }

    /// Verify `response` for `nonce`, consuming the nonce.
    ///
    /// Returns `false` for every failure cause alike.
    pub fn verify_response(&self, response: &str, nonce: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }

        if !self.nonces.remove(&nonce.to_string()) {
            debug!("Rejected challenge response: nonce not outstanding");
            return false;
        }

        let expected = expected_response(nonce, &self.secret);
        let matches: bool = expected.as_bytes().ct_eq(response.as_bytes()).into();
        if !matches {
            debug!("Rejected challenge response: hash mismatch");
        }
        matches
    }
}

impl std::fmt::Debug for ChallengeAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeAuth")
            .field("enabled", &self.is_enabled())
            .field("nonces", &self.nonces)
            .finish()
    }
}

/// Lowercase hex SHA-256 of `nonce + secret + nonce` (string concatenation).
pub fn expected_response(nonce: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}
