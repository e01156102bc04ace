//! The live session-context map.
//!
//! Each session inserts its host context capability under its session id at
//! construction and removes it on drop, so the map always contains exactly
//! the live sessions. The application looks contexts up through the side
//! channel by echoing back the `X-Sandstorm-Session-Id` header value.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use gangway_types::{BridgeError, SessionContext};

/// Process-wide map from session id to the host-supplied context.
///
/// The adapter runs on one event loop, but tests drive it from
/// multi-threaded runtimes, so access is serialized by a mutex rather than
/// by convention.
#[derive(Default)]
pub struct SessionRegistry {
    map: Mutex<HashMap<String, Arc<dyn SessionContext>>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(SessionRegistry::default())
    }

    pub fn insert(&self, id: String, context: Arc<dyn SessionContext>) {
        self.map.lock().insert(id, context);
    }

    pub fn remove(&self, id: &str) {
        self.map.lock().remove(id);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn SessionContext>, BridgeError> {
        self.map
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::SessionNotFound(id.to_owned()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.lock().contains_key(id)
    }
}
