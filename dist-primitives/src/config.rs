//! Runtime configuration for a node.
//!
//! Built from the command line in `cli`, or directly by tests.

use std::time::Duration;

use clap::ValueEnum;

/// Which set of message handlers a node serves.
///
/// Workloads are mutually exclusive because some of them reuse the same
/// message type (`read` is both a broadcast read and a counter read).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Workload {
    Echo,
    UniqueIds,
    Broadcast,
    Counter,
    Kafka,
    Txn,
}

/// Storage backend behind the topic log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogBackendKind {
    /// Node-local topics; only correct for a single node.
    Memory,
    /// Topics kept in the cluster's linearizable KV service.
    Kv,
}

/// Backoff schedule for a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn log_cas() -> Self {
        Self {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(64),
            max_attempts: None,
        }
    }

    pub fn txn_locks() -> Self {
        Self {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(100),
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Everything a node needs besides its identity, which arrives with `init`.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub workload: Workload,
    pub log_backend: LogBackendKind,
    /// KV service used by the topic log.
    pub log_kv_service: String,
    /// KV service used by the grow-only counter.
    pub counter_kv_service: String,
    /// Upper bound on every individual KV call.
    pub kv_timeout: Duration,
    /// Upper bound on one replication call to one peer.
    pub replication_timeout: Duration,
    /// Replication batches allowed to wait, and separately to be in flight,
    /// before new ones are dropped.
    pub replication_queue: usize,
    pub log_retry: RetryPolicy,
    pub txn_retry: RetryPolicy,
}

impl NodeConfig {
    pub fn new(workload: Workload) -> Self {
        Self {
            workload,
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            workload: Workload::Echo,
            log_backend: LogBackendKind::Kv,
            log_kv_service: "lin-kv".to_string(),
            counter_kv_service: "seq-kv".to_string(),
            kv_timeout: Duration::from_secs(5),
            replication_timeout: Duration::from_secs(1),
            replication_queue: 1024,
            log_retry: RetryPolicy::log_cas(),
            txn_retry: RetryPolicy::txn_locks(),
        }
    }
}
