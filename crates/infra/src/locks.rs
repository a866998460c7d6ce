//! Per-key exclusive locks.
//!
//! A unit of work locks every (item, warehouse) key it will touch in one
//! step: either all keys are granted or the caller waits. Since no caller
//! ever holds some keys while waiting for others, lock ordering deadlocks
//! cannot occur. Units of work on disjoint keys never wait for each other.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex};

use thiserror::Error;

use stockledger_inventory::LedgerKey;

#[derive(Debug, Error)]
#[error("key lock table poisoned")]
pub struct LockPoisoned;

/// Table of keys currently held by in-flight units of work.
#[derive(Debug, Default)]
pub struct KeyLockTable {
    held: Mutex<HashSet<LedgerKey>>,
    released: Condvar,
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every key in `keys` is free, then take them all.
    pub fn acquire(&self, keys: BTreeSet<LedgerKey>) -> Result<KeyLockGuard<'_>, LockPoisoned> {
        let mut held = self.held.lock().map_err(|_| LockPoisoned)?;
        while keys.iter().any(|k| held.contains(k)) {
            held = self.released.wait(held).map_err(|_| LockPoisoned)?;
        }
        held.extend(keys.iter().cloned());

        Ok(KeyLockGuard { table: self, keys })
    }

    /// Take every key in `keys` only if none is held right now.
    pub fn try_acquire(
        &self,
        keys: BTreeSet<LedgerKey>,
    ) -> Result<Option<KeyLockGuard<'_>>, LockPoisoned> {
        let mut held = self.held.lock().map_err(|_| LockPoisoned)?;
        if keys.iter().any(|k| held.contains(k)) {
            return Ok(None);
        }
        held.extend(keys.iter().cloned());

        Ok(Some(KeyLockGuard { table: self, keys }))
    }

    pub fn is_locked(&self, key: &LedgerKey) -> bool {
        self.held.lock().map(|h| h.contains(key)).unwrap_or(false)
    }

    fn release(&self, keys: &BTreeSet<LedgerKey>) {
        if let Ok(mut held) = self.held.lock() {
            for key in keys {
                held.remove(key);
            }
        }
        self.released.notify_all();
    }
}

/// Keys held by one unit of work; released on drop.
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    table: &'a KeyLockTable,
    keys: BTreeSet<LedgerKey>,
}

impl KeyLockGuard<'_> {
    pub fn keys(&self) -> &BTreeSet<LedgerKey> {
        &self.keys
    }

    pub fn covers(&self, key: &LedgerKey) -> bool {
        self.keys.contains(key)
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.keys);
    }
}
