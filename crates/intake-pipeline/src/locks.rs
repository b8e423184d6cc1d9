//! Per-session serialization.
//!
//! Two concurrent turns on the same session would both read the same stale
//! persisted state and each overwrite the other's contribution. Turns for a
//! single session id therefore run under one async mutex, held across the
//! whole turn (including the extraction round trip), while distinct
//! sessions proceed fully concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Registry of per-session async locks.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock for a session id. The caller awaits
    /// `.lock()` on the returned handle; the registry's own mutex is only
    /// held for the map lookup, never across an await.
    pub fn handle(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(map.entry(id).or_default())
    }

    /// Drop the session's entry if no turn currently holds a handle to it.
    /// Called after each turn so the registry does not grow by one entry
    /// per session ever seen. A concurrent `handle` call keeps the entry
    /// alive via its strong count.
    pub fn release(&self, id: Uuid) {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = map.get(&id) {
            if Arc::strong_count(entry) == 1 {
                map.remove(&id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
