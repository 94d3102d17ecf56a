//! Named exclusive locks.
//!
//! A `LockTable` hands out at most one [`StoreLock`] per name at a time.
//! Callers asking for a held name block until the holder drops its guard.
//! Release happens in `Drop`, so every exit path of a critical section,
//! including `?` and panics, gives the lock back.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tracing::trace;

#[derive(Default)]
struct Inner {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Table of named locks shared by all clones of a `StateStore`.
#[derive(Clone, Default)]
pub struct LockTable {
    inner: Arc<Inner>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock with the given name, blocking while another guard holds it.
    pub fn acquire(&self, name: &str) -> StoreLock {
        let mut held = self
            .inner
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while held.contains(name) {
            held = self
                .inner
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(name.to_string());
        trace!(lock = name, "lock acquired");
        StoreLock {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
        }
    }

    /// Whether a lock with this name is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.inner
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

/// Guard for a held named lock. Dropping it releases the lock.
pub struct StoreLock {
    inner: Arc<Inner>,
    name: String,
}

impl StoreLock {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        self.inner
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
        self.inner.released.notify_all();
        trace!(lock = %self.name, "lock released");
    }
}
