use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::traits::{SessionStore, StoreError};
use super::types::Session;
use crate::types::SessionId;

/// Default idle lifetime of a session.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on the time between two sweeps triggered by writes.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    session: Session,
    last_access: Instant,
}

struct Inner {
    entries: HashMap<SessionId, Entry>,
    last_sweep: Instant,
}

impl Inner {
    fn sweep(&mut self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_access.elapsed() <= ttl);
        self.last_sweep = Instant::now();
        before - self.entries.len()
    }
}

/// Process-local session store with idle expiry.
///
/// Cloning shares the underlying map. A session untouched for longer than
/// the idle TTL is dropped on its next access. Writes also sweep the whole
/// map once per TTL (at most a minute apart), so abandoned logins do not
/// accumulate; [`evict_expired`] forces a sweep.
///
/// [`evict_expired`]: MemorySessionStore::evict_expired
#[derive(Clone)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<Inner>>,
    idle_ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TTL)
    }
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            idle_ttl,
        }
    }

    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Number of stored sessions, including ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every session idle past the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let Ok(mut inner) = self.lock() else {
            return 0;
        };
        let removed = inner.sweep(self.idle_ttl);
        if removed > 0 {
            tracing::debug!(removed, "Evicted idle sessions");
        }
        removed
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| "session store lock poisoned".into())
    }
}

impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let mut inner = self.lock()?;
        let expired = match inner.entries.get_mut(id) {
            None => return Ok(None),
            Some(entry) if entry.last_access.elapsed() > self.idle_ttl => true,
            Some(entry) => {
                entry.last_access = Instant::now();
                return Ok(Some(entry.session.clone()));
            }
        };
        if expired {
            inner.entries.remove(id);
        }
        Ok(None)
    }

    async fn set(&self, session: Session) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.last_sweep.elapsed() >= self.idle_ttl.min(MAX_SWEEP_INTERVAL) {
            let removed = inner.sweep(self.idle_ttl);
            if removed > 0 {
                tracing::debug!(removed, "Evicted idle sessions");
            }
        }
        inner.entries.insert(
            session.id.clone(),
            Entry {
                session,
                last_access: Instant::now(),
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        self.lock()?.entries.remove(id);
        Ok(())
    }
}
