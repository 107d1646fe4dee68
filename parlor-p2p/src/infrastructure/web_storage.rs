use gloo_storage::{SessionStorage, Storage};
use parlor_core::storage::SessionStore;

/// Browser `sessionStorage`-backed store: one tab, one participant.
#[derive(Debug, Default)]
pub struct BrowserSessionStore;

impl BrowserSessionStore {
    pub fn new() -> Self {
        Self
    }
}

impl SessionStore for BrowserSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        SessionStorage::get::<String>(key).ok()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Err(err) = SessionStorage::set(key, value.to_string()) {
            tracing::warn!(key, %err, "session storage write failed");
        }
    }

    fn remove(&mut self, key: &str) {
        SessionStorage::delete(key);
    }
}
