//! Settings Module
//!
//! Persistence for the single settings string (the feed whitelist).

mod store;

pub use store::{FileStore, MemoryStore, SettingsStore};

/// Separator between whitelisted keys in the settings value.
pub const WHITELIST_SEPARATOR: char = ';';

/// Reports whether `key` appears in a `;`-separated whitelist.
///
/// An empty whitelist allows nothing.
pub fn whitelist_contains(settings: &str, key: &str) -> bool {
    !settings.is_empty() && settings.split(WHITELIST_SEPARATOR).any(|entry| entry == key)
}
