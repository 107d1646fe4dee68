//! Per-session key-value persistence.
//!
//! The only durable state the substrate keeps: the local participant's
//! logical id, display name and session token. The store is a capability
//! handed in at construction, never a process-wide static, so hosts and
//! tests can run many participants side by side.

use std::collections::HashMap;

/// Well-known store keys.
pub mod keys {
    pub const PLAYER_ID: &str = "parlor.player_id";
    pub const DISPLAY_NAME: &str = "parlor.display_name";
    pub const SESSION_TOKEN: &str = "parlor.session_token";
}

/// String key-value store scoped to one browser session (one tab).
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory store for native targets and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}
