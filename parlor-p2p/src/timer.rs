//! Poll-driven deadlines.
//!
//! The event loop owns all timing: nothing here spawns tasks or threads. A
//! deadline is armed with an absolute `now_ms`-style instant and fires the
//! next time the loop polls past it.

/// A set of keyed deadlines. Re-arming a key replaces its deadline.
#[derive(Debug, Clone)]
pub struct TimerQueue<K> {
    entries: Vec<(K, u64)>,
}

impl<K: PartialEq + Clone> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn schedule(&mut self, key: K, deadline_ms: u64) {
        self.cancel(&key);
        self.entries.push((key, deadline_ms));
    }

    pub fn cancel(&mut self, key: &K) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Remove and return every key whose deadline has passed.
    pub fn expire(&mut self, now_ms: u64) -> Vec<K> {
        let mut due = Vec::new();
        self.entries.retain(|(key, deadline)| {
            if *deadline <= now_ms {
                due.push(key.clone());
                false
            } else {
                true
            }
        });
        due
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: PartialEq + Clone> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
