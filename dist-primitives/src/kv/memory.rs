use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::KvStore;
use crate::error::KvError;

/// In-process KV store with linearizable semantics.
///
/// Every call takes the same mutex, so calls are totally ordered. With
/// `interleaved` set, each call first yields to the scheduler, which lets
/// concurrent callers race between their read and their compare-and-swap.
#[derive(Debug, Default)]
pub struct MemoryKv {
    data: Mutex<BTreeMap<String, i64>>,
    interleaved: bool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that yields before every operation, for contention tests.
    pub fn interleaved() -> Self {
        Self {
            data: Mutex::new(BTreeMap::new()),
            interleaved: true,
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.data().clone()
    }

    fn data(&self) -> MutexGuard<'_, BTreeMap<String, i64>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn maybe_yield(&self) {
        if self.interleaved {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn read(&self, key: &str) -> Result<i64, KvError> {
        self.maybe_yield().await;
        self.data()
            .get(key)
            .copied()
            .ok_or_else(|| KvError::NotFound { key: key.to_string() })
    }

    async fn write(&self, key: &str, value: i64) -> Result<(), KvError> {
        self.maybe_yield().await;
        self.data().insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        from: i64,
        to: i64,
        create_if_missing: bool,
    ) -> Result<(), KvError> {
        self.maybe_yield().await;
        let mut data = self.data();
        match data.get(key).copied() {
            None if !create_if_missing => Err(KvError::NotFound { key: key.to_string() }),
            Some(current) if current != from => {
                Err(KvError::PreconditionFailed { key: key.to_string() })
            }
            _ => {
                data.insert(key.to_string(), to);
                Ok(())
            }
        }
    }
}
