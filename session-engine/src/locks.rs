use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use common::error::AppError;

/// In-process keyed lock serializing turns per session.
///
/// Acquisition is try-only: a second caller on the same session gets
/// `SessionBusy` instead of queueing, so no request ever parks behind an
/// LLM call it didn't start.
#[derive(Clone, Default)]
pub struct SessionLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, session_id: &str) -> Result<SessionLockGuard, AppError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        if !held.insert(session_id.to_string()) {
            return Err(AppError::SessionBusy(format!(
                "a turn is already in flight for session {session_id}"
            )));
        }

        Ok(SessionLockGuard {
            held: Arc::clone(&self.held),
            session_id: session_id.to_string(),
        })
    }
}

/// Releases the session on drop, on every exit path including panics.
pub struct SessionLockGuard {
    held: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.session_id);
    }
}
