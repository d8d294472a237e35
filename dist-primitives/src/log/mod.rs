//! Offset-addressed, append-only topic logs.
//!
//! A topic is an ordered sequence of [`LogEntry`] plus a committed-offset
//! cursor. Two backends implement [`TopicLog`]:
//!
//! - [`MemoryLog`] keeps topics in this process; correct for a single node.
//! - [`KvLog`] keeps topics in a linearizable [`KvStore`](crate::kv::KvStore)
//!   and allocates offsets with compare-and-swap, so any number of nodes can
//!   append to the same topic.

mod kv;
mod memory;

pub use kv::KvLog;
pub use memory::MemoryLog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// One record of a topic. Serialized as `[offset, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, i64)", into = "(u64, i64)")]
pub struct LogEntry {
    pub offset: u64,
    pub value: i64,
}

impl From<(u64, i64)> for LogEntry {
    fn from((offset, value): (u64, i64)) -> Self {
        Self { offset, value }
    }
}

impl From<LogEntry> for (u64, i64) {
    fn from(entry: LogEntry) -> Self {
        (entry.offset, entry.value)
    }
}

#[async_trait]
pub trait TopicLog: Send + Sync {
    /// Appends `value` and returns the offset it was stored at.
    async fn append(&self, topic: &str, value: i64) -> Result<u64, LogError>;

    /// Entries with offset `>= from`, ascending. Unknown topics are empty.
    async fn poll(&self, topic: &str, from: u64) -> Result<Vec<LogEntry>, LogError>;

    /// Overwrites the topic's committed offset. No monotonicity check.
    async fn commit(&self, topic: &str, offset: u64) -> Result<(), LogError>;

    /// The last committed offset, or `None` if the topic never committed.
    async fn committed_offset(&self, topic: &str) -> Result<Option<u64>, LogError>;

    /// The last committed offset, defaulting to 0.
    async fn get_committed_offset(&self, topic: &str) -> Result<u64, LogError> {
        Ok(self.committed_offset(topic).await?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_serialize_as_pairs() {
        let entry = LogEntry { offset: 3, value: 42 };
        let encoded = serde_json::to_string(&entry).expect("encode");
        assert_eq!(encoded, "[3,42]");
        let decoded: LogEntry = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, entry);
    }
}
