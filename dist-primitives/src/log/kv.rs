use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{LogEntry, TopicLog};
use crate::config::RetryPolicy;
use crate::error::{KvError, LogError};
use crate::kv::KvStore;
use crate::retry::Backoff;

/// Topic storage kept entirely in a linearizable KV store.
///
/// Per topic the store holds:
///
/// - `<topic>.offset`: the highest allocated offset (absent means -1)
/// - `<topic>.data.<n>`: the value appended at offset `n`
/// - `<topic>.commited_offset`: the committed cursor
///
/// No state is kept in this process. An append first reserves an offset by
/// compare-and-swap on the counter and then writes the value; if the second
/// step fails the offset stays reserved but empty, and polls skip it.
pub struct KvLog<K: KvStore + ?Sized> {
    kv: Arc<K>,
    retry: RetryPolicy,
}

impl<K: KvStore + ?Sized> KvLog<K> {
    pub fn new(kv: Arc<K>, retry: RetryPolicy) -> Self {
        Self { kv, retry }
    }

    /// Reserves the next offset of `topic`.
    async fn reserve_offset(&self, topic: &str) -> Result<u64, LogError> {
        let key = offset_key(topic);
        let mut backoff = Backoff::new(self.retry);

        loop {
            let current = self.kv.read_optional(&key).await?.unwrap_or(-1);
            let next = current + 1;

            match self.kv.compare_and_swap(&key, current, next, true).await {
                Ok(()) => return Ok(next as u64),
                Err(KvError::PreconditionFailed { .. }) => {
                    let Some(delay) = backoff.next_delay() else {
                        return Err(LogError::RetriesExhausted {
                            key,
                            attempts: backoff.attempts(),
                        });
                    };
                    debug!(topic, current, attempt = backoff.attempts(), "offset race lost, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl<K: KvStore + ?Sized> TopicLog for KvLog<K> {
    async fn append(&self, topic: &str, value: i64) -> Result<u64, LogError> {
        let offset = self.reserve_offset(topic).await?;
        self.kv.write(&data_key(topic, offset), value).await?;
        Ok(offset)
    }

    async fn poll(&self, topic: &str, from: u64) -> Result<Vec<LogEntry>, LogError> {
        let Some(last) = self.kv.read_optional(&offset_key(topic)).await? else {
            return Ok(Vec::new());
        };
        if last < 0 {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for offset in from..=last as u64 {
            // Reserved offsets whose value never landed are skipped.
            if let Some(value) = self.kv.read_optional(&data_key(topic, offset)).await? {
                entries.push(LogEntry { offset, value });
            }
        }
        Ok(entries)
    }

    async fn commit(&self, topic: &str, offset: u64) -> Result<(), LogError> {
        self.kv
            .write(&committed_key(topic), offset as i64)
            .await?;
        Ok(())
    }

    async fn committed_offset(&self, topic: &str) -> Result<Option<u64>, LogError> {
        let committed = self.kv.read_optional(&committed_key(topic)).await?;
        Ok(committed.map(|offset| offset.max(0) as u64))
    }
}

fn offset_key(topic: &str) -> String {
    format!("{topic}.offset")
}

fn data_key(topic: &str, offset: u64) -> String {
    format!("{topic}.data.{offset}")
}

fn committed_key(topic: &str) -> String {
    format!("{topic}.commited_offset")
}
