//! Multi-key transactions over node-local state.
//!
//! A transaction locks every key it touches, applies its operations in
//! order against this node's map, unlocks, and answers. Its writes are then
//! handed to the [`Replicator`], which pushes them to every peer on a
//! best-effort basis. Peers apply those writes without taking locks, so
//! nodes converge only eventually and with no ordering between origins.

mod locks;
mod op;
mod replication;

pub use locks::{LockGuard, LockTable, TxnId};
pub use op::Op;
pub use replication::{ClusterTransport, PeerTransport, ReplicationBatch, Replicator};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::TxnError;
use crate::retry::Backoff;

/// Body of a `txn` request and of its `txn_ok` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnRequest {
    pub txn: Vec<Op>,
}

pub struct TxnEngine {
    data: RwLock<HashMap<i64, i64>>,
    locks: LockTable,
    next_txn: AtomicU64,
    retry: RetryPolicy,
    replicator: Replicator,
}

impl TxnEngine {
    pub fn new(retry: RetryPolicy, replicator: Replicator) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            locks: LockTable::new(),
            next_txn: AtomicU64::new(1),
            retry,
            replicator,
        }
    }

    /// Runs `ops` atomically with respect to every other transaction sharing
    /// a key, and returns them with read values filled in.
    pub async fn execute(&self, ops: Vec<Op>) -> Result<Vec<Op>, TxnError> {
        let owner = TxnId(self.next_txn.fetch_add(1, Ordering::Relaxed));
        let keys: Vec<i64> = ops
            .iter()
            .map(Op::key)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let guard = self.acquire(&keys, owner).await?;
        let (results, writes) = self.apply(ops);
        drop(guard);

        if !writes.is_empty() {
            let batch: ReplicationBatch = writes
                .into_iter()
                .map(|(key, value)| Op::write(key, value))
                .collect();
            self.replicator.enqueue(batch);
        }
        Ok(results)
    }

    /// Applies writes received from a peer. Bypasses the lock table.
    pub fn apply_replicated(&self, ops: &[Op]) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        for op in ops {
            if let Op::Write { key, value } = *op {
                data.insert(key, value);
            }
        }
    }

    /// Current local value of `key`.
    pub fn get(&self, key: i64) -> Option<i64> {
        self.read(key)
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Stops replication; pending and in-flight batches are abandoned.
    pub fn shutdown(&self) {
        self.replicator.shutdown();
    }

    async fn acquire(&self, keys: &[i64], owner: TxnId) -> Result<LockGuard<'_>, TxnError> {
        let mut backoff = Backoff::new(self.retry);
        loop {
            if let Some(guard) = self.locks.try_acquire(keys, owner) {
                return Ok(guard);
            }
            let Some(delay) = backoff.next_delay() else {
                return Err(TxnError::LockContention {
                    keys: keys.to_vec(),
                    attempts: backoff.attempts(),
                });
            };
            debug!(%owner, ?keys, attempt = backoff.attempts(), "keys busy, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    /// Applies operations in request order. Returns the echoed operations and
    /// the last value written to each key.
    fn apply(&self, ops: Vec<Op>) -> (Vec<Op>, BTreeMap<i64, i64>) {
        let mut writes = BTreeMap::new();
        let results = ops
            .into_iter()
            .map(|op| match op {
                Op::Read { key, .. } => Op::Read {
                    key,
                    value: self.read(key),
                },
                Op::Write { key, value } => {
                    self.write(key, value);
                    writes.insert(key, value);
                    op
                }
            })
            .collect();
        (results, writes)
    }

    fn read(&self, key: i64) -> Option<i64> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    fn write(&self, key: i64, value: i64) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}
