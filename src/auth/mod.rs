//! Settings authentication.
//!
//! Provides single-use nonce tracking and challenge-response verification
//! for privileged settings updates.

mod challenge;
mod nonce;

pub use challenge::{expected_response, ChallengeAuth, NONCE_BYTES};
pub use nonce::ExpiringNonceSet;
