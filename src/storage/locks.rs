//! Keyed exclusive locks shared by all transactions of one store.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::storage::traits::{LockKey, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Table of currently held keys.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    held: Mutex<HashSet<LockKey>>,
    released: Condvar,
}

/// Keys held by one transaction. Released on drop.
#[derive(Debug)]
pub(crate) struct HeldLocks<'a> {
    table: &'a LockTable,
    keys: Vec<LockKey>,
}

impl<'a> HeldLocks<'a> {
    pub(crate) fn new(table: &'a LockTable) -> Self {
        Self {
            table,
            keys: Vec::new(),
        }
    }

    pub(crate) fn holds(&self, key: &LockKey) -> bool {
        self.keys.contains(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        // A poisoned table still has to give keys back or every later
        // transaction on them would time out.
        let mut held = match self.table.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in self.keys.drain(..) {
            held.remove(&key);
        }
        drop(held);
        self.table.released.notify_all();
    }
}

impl LockTable {
    /// Acquire every key in `keys` (ascending, duplicates and already-held
    /// keys skipped) into `into`.
    ///
    /// On timeout the keys taken by this call are given back; keys taken by
    /// earlier calls stay in `into`.
    pub(crate) fn acquire(
        &self,
        keys: &[LockKey],
        timeout: Duration,
        into: &mut HeldLocks<'_>,
    ) -> Result<(), StorageError> {
        let mut wanted: Vec<LockKey> = keys.iter().filter(|k| !into.holds(k)).cloned().collect();
        wanted.sort();
        wanted.dedup();

        // A timeout too large to represent means waiting without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut taken: Vec<LockKey> = Vec::with_capacity(wanted.len());
        let mut held = self.held.lock().map_err(|_| lock_err("locks.acquire"))?;

        for key in wanted {
            while held.contains(&key) {
                let Some(deadline) = deadline else {
                    held = self.released.wait(held).map_err(|_| lock_err("locks.wait"))?;
                    continue;
                };
                let now = Instant::now();
                if now >= deadline {
                    for k in &taken {
                        held.remove(k);
                    }
                    drop(held);
                    self.released.notify_all();
                    return Err(StorageError::Conflict(format!(
                        "lock {key} not acquired within {}ms",
                        timeout.as_millis()
                    )));
                }
                let (guard, _) = self
                    .released
                    .wait_timeout(held, deadline - now)
                    .map_err(|_| lock_err("locks.wait"))?;
                held = guard;
            }
            held.insert(key.clone());
            taken.push(key);
        }

        into.keys.extend(taken);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }
}
