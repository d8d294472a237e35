use async_trait::async_trait;
use dashmap::DashMap;

use super::{LogEntry, TopicLog};
use crate::error::LogError;

#[derive(Debug, Default)]
struct Topic {
    values: Vec<i64>,
    committed: Option<u64>,
}

/// Node-local topic storage.
///
/// Each topic lives in its own map entry, so appends to different topics
/// never contend. Offsets are vector indices and therefore gap-free.
#[derive(Debug, Default)]
pub struct MemoryLog {
    topics: DashMap<String, Topic>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopicLog for MemoryLog {
    async fn append(&self, topic: &str, value: i64) -> Result<u64, LogError> {
        let mut entry = self.topics.entry(topic.to_string()).or_default();
        entry.values.push(value);
        Ok(entry.values.len() as u64 - 1)
    }

    async fn poll(&self, topic: &str, from: u64) -> Result<Vec<LogEntry>, LogError> {
        let Some(entry) = self.topics.get(topic) else {
            return Ok(Vec::new());
        };
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        Ok(entry
            .values
            .iter()
            .enumerate()
            .skip(start)
            .map(|(offset, value)| LogEntry {
                offset: offset as u64,
                value: *value,
            })
            .collect())
    }

    async fn commit(&self, topic: &str, offset: u64) -> Result<(), LogError> {
        self.topics.entry(topic.to_string()).or_default().committed = Some(offset);
        Ok(())
    }

    async fn committed_offset(&self, topic: &str) -> Result<Option<u64>, LogError> {
        Ok(self.topics.get(topic).and_then(|entry| entry.committed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn appends_are_sequential_per_topic() {
        let log = MemoryLog::new();
        assert_eq!(log.append("orders", 10).await.expect("append"), 0);
        assert_eq!(log.append("orders", 20).await.expect("append"), 1);
        assert_eq!(log.append("payments", 5).await.expect("append"), 0);

        let entries = log.poll("orders", 0).await.expect("poll");
        assert_eq!(
            entries,
            vec![
                LogEntry { offset: 0, value: 10 },
                LogEntry { offset: 1, value: 20 }
            ]
        );
        assert_eq!(
            log.poll("orders", 1).await.expect("poll"),
            vec![LogEntry { offset: 1, value: 20 }]
        );
        assert!(log.poll("orders", 7).await.expect("poll").is_empty());
        assert!(log.poll("unknown", 0).await.expect("poll").is_empty());
    }

    #[tokio::test]
    async fn committed_offset_is_last_write_wins() {
        let log = MemoryLog::new();
        assert_eq!(log.committed_offset("orders").await.expect("read"), None);
        assert_eq!(log.get_committed_offset("orders").await.expect("read"), 0);

        log.commit("orders", 5).await.expect("commit");
        log.commit("orders", 2).await.expect("commit");
        assert_eq!(log.get_committed_offset("orders").await.expect("read"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_get_distinct_offsets() {
        let log = Arc::new(MemoryLog::new());
        let mut tasks = Vec::new();
        for value in 0..64 {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move { log.append("t", value).await }));
        }

        let mut offsets = Vec::new();
        for task in tasks {
            offsets.push(task.await.expect("join").expect("append"));
        }
        offsets.sort_unstable();
        assert_eq!(offsets, (0..64).collect::<Vec<u64>>());
    }
}
