use std::sync::Arc;

use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::{KvError, LogError};
use crate::kv::KvStore;
use crate::retry::Backoff;

const COUNTER_KEY: &str = "global-counter";

/// Grow-only counter shared by the cluster through a KV store.
///
/// Works on a sequentially consistent store: reads are turned into a
/// compare-and-swap of the current value onto itself, which only succeeds
/// against the latest value and so cannot return a stale read.
pub struct Counter<K: KvStore + ?Sized> {
    kv: Arc<K>,
    retry: RetryPolicy,
}

impl<K: KvStore + ?Sized> Counter<K> {
    pub fn new(kv: Arc<K>, retry: RetryPolicy) -> Self {
        Self { kv, retry }
    }

    /// Adds `delta` and returns the new total.
    pub async fn add(&self, delta: i64) -> Result<i64, LogError> {
        let mut backoff = Backoff::new(self.retry);
        loop {
            let current = self.kv.read_optional(COUNTER_KEY).await?.unwrap_or(0);
            let next = current.checked_add(delta).ok_or_else(|| LogError::Overflow {
                key: COUNTER_KEY.to_string(),
                current,
                delta,
            })?;
            match self
                .kv
                .compare_and_swap(COUNTER_KEY, current, next, true)
                .await
            {
                Ok(()) => return Ok(next),
                Err(KvError::PreconditionFailed { .. }) => {
                    let Some(delay) = backoff.next_delay() else {
                        return Err(LogError::RetriesExhausted {
                            key: COUNTER_KEY.to_string(),
                            attempts: backoff.attempts(),
                        });
                    };
                    debug!(current, delta, "counter moved underneath us, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn read(&self) -> Result<i64, LogError> {
        self.add(0).await
    }
}
