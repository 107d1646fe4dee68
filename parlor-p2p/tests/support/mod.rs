pub mod mock_connection;

use parlor_core::storage::SessionStore;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Clonable session store; clones see the same entries. Lets a test hand the
/// "same tab" to a reconnecting session.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for SharedStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Install a test subscriber once so failing tests show the protocol chatter.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
