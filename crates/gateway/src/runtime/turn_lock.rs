//! Per-session turn serialization.
//!
//! Two turns must never interleave within one session: message ordering
//! and gapless sequence numbers both depend on it. Each session id maps
//! to a `Semaphore(1)`; a turn holds the permit for its full duration.
//! A second turn arriving while one is in flight is rejected rather
//! than queued, so a stuck provider cannot pile up waiters.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-session single-flight lock map.
pub struct TurnLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for TurnLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn permit for a session without waiting.
    ///
    /// Returns the permit (held for the duration of the turn, released
    /// on drop) or [`SessionBusy`] when a turn is already in flight.
    pub fn try_acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.try_acquire_owned().map_err(|_| SessionBusy)
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries whose permit is not currently held.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// A turn is already in progress for this session.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a turn is already in progress for this session")
    }
}

impl std::error::Error for SessionBusy {}
