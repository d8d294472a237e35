//! Per-key exclusive locks owned by in-flight transactions.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque owner token of a lock: the transaction that claimed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Which transaction holds which key.
///
/// A single mutex guards the whole table. It is held only while checking and
/// claiming one batch of keys, never across an await.
#[derive(Debug, Default)]
pub struct LockTable {
    owners: Mutex<HashMap<i64, TxnId>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every key in `keys` for `owner`, or none of them.
    ///
    /// `keys` should be sorted and free of duplicates; acquiring in one global
    /// order is what keeps transactions from deadlocking each other.
    pub fn try_acquire(&self, keys: &[i64], owner: TxnId) -> Option<LockGuard<'_>> {
        let mut owners = self.owners();
        for (claimed, key) in keys.iter().enumerate() {
            let held_elsewhere = owners.get(key).is_some_and(|holder| *holder != owner);
            if held_elsewhere {
                for key in &keys[..claimed] {
                    owners.remove(key);
                }
                return None;
            }
            owners.insert(*key, owner);
        }
        Some(LockGuard {
            table: self,
            keys: keys.to_vec(),
            owner,
        })
    }

    pub fn owner(&self, key: i64) -> Option<TxnId> {
        self.owners().get(&key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.owners().is_empty()
    }

    fn release(&self, keys: &[i64], owner: TxnId) {
        let mut owners = self.owners();
        for key in keys {
            if owners.get(key) == Some(&owner) {
                owners.remove(key);
            }
        }
    }

    fn owners(&self) -> MutexGuard<'_, HashMap<i64, TxnId>> {
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keys held by one transaction; released when dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    table: &'a LockTable,
    keys: Vec<i64>,
    owner: TxnId,
}

impl LockGuard<'_> {
    pub fn owner(&self) -> TxnId {
        self.owner
    }

    pub fn keys(&self) -> &[i64] {
        &self.keys
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.keys, self.owner);
    }
}
