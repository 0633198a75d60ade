use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use tracing::debug;

use crate::controller::{Session, Widget};

pub const DEFAULT_SESSION_CAPACITY: usize = 4096;
const SESSION_ID_LEN: usize = 24;

/// One controller per browser session, least recently used evicted first.
#[derive(Clone)]
pub struct SessionStore {
    widget: Arc<Widget>,
    sessions: Arc<Mutex<LruCache<String, Session>>>,
}

impl SessionStore {
    pub fn new(widget: Arc<Widget>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            widget,
            sessions: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn widget(&self) -> &Arc<Widget> {
        &self.widget
    }

    /// Runs `event` against the session `id`, creating it when unknown or
    /// evicted. Returns the id actually used, which differs from `id` when a
    /// fresh session had to be minted.
    pub fn with_session<T>(
        &self,
        id: Option<&str>,
        event: impl FnOnce(&mut Session) -> T,
    ) -> (String, T) {
        let mut guard = self.sessions.lock();
        let id = match id.filter(|id| is_valid_session_id(id) && guard.contains(*id)) {
            Some(id) => id.to_string(),
            None => {
                let id = generate_session_id();
                debug!(session = %id, "new widget session");
                guard.put(id.clone(), Session::new(Arc::clone(&self.widget)));
                id
            }
        };
        let result = match guard.get_mut(&id) {
            Some(session) => event(session),
            None => {
                let mut session = Session::new(Arc::clone(&self.widget));
                let result = event(&mut session);
                guard.put(id.clone(), session);
                result
            }
        };
        (id, result)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

pub fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == SESSION_ID_LEN && id.bytes().all(|byte| byte.is_ascii_alphanumeric())
}
