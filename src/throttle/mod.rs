//! Throttle Module
//!
//! Rate limiting for calls to the upstream source.

mod bucket;

pub use bucket::{Cancelled, TokenBucketThrottle};
