use std::time::Duration;

use clap::Parser;

use crate::config::{LogBackendKind, NodeConfig, RetryPolicy, Workload};

/// A cluster node speaking newline-delimited JSON on stdin/stdout.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Which set of messages this node serves.
    #[arg(long, value_enum)]
    pub workload: Workload,

    /// Where the kafka workload keeps its topics.
    #[arg(long, value_enum, default_value = "kv")]
    pub log_backend: LogBackendKind,

    /// Timeout for each call to a KV service, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub kv_timeout_ms: u64,

    /// Timeout for each replication call to a peer, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub replication_timeout_ms: u64,

    /// Replication batches allowed to wait, and to be in flight, before new ones are dropped.
    #[arg(long, default_value_t = 1024)]
    pub replication_queue: usize,

    /// Give up a compare-and-swap loop after this many attempts. Unbounded if unset.
    #[arg(long)]
    pub cas_max_attempts: Option<u32>,

    /// Give up acquiring transaction locks after this many attempts. Unbounded if unset.
    #[arg(long)]
    pub lock_max_attempts: Option<u32>,
}

impl Cli {
    pub fn into_config(self) -> NodeConfig {
        NodeConfig {
            log_backend: self.log_backend,
            kv_timeout: Duration::from_millis(self.kv_timeout_ms),
            replication_timeout: Duration::from_millis(self.replication_timeout_ms),
            replication_queue: self.replication_queue,
            log_retry: RetryPolicy::log_cas().with_max_attempts(self.cas_max_attempts),
            txn_retry: RetryPolicy::txn_locks().with_max_attempts(self.lock_max_attempts),
            ..NodeConfig::new(self.workload)
        }
    }
}
