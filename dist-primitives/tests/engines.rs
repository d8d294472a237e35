use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::timeout;

use dist_primitives::config::RetryPolicy;
use dist_primitives::error::RpcError;
use dist_primitives::kv::MemoryKv;
use dist_primitives::log::{KvLog, LogEntry, MemoryLog, TopicLog};
use dist_primitives::txn::{Op, PeerTransport, Replicator, TxnEngine, TxnId};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_kv_appends_get_every_offset_once() {
    let kv = Arc::new(MemoryKv::interleaved());
    let log = Arc::new(KvLog::new(Arc::clone(&kv), RetryPolicy::log_cas()));

    let appends = (0..64i64).map(|value| {
        let log = Arc::clone(&log);
        tokio::spawn(async move { (log.append("orders", value).await.expect("append"), value) })
    });
    let results: Vec<(u64, i64)> = join_all(appends)
        .await
        .into_iter()
        .map(|joined| joined.expect("join"))
        .collect();

    let offsets: BTreeSet<u64> = results.iter().map(|(offset, _)| *offset).collect();
    assert_eq!(offsets, (0..64).collect());

    let mut expected: Vec<LogEntry> = results
        .into_iter()
        .map(|(offset, value)| LogEntry { offset, value })
        .collect();
    expected.sort_by_key(|entry| entry.offset);
    assert_eq!(log.poll("orders", 0).await.expect("poll"), expected);
    assert_eq!(kv.snapshot().get("orders.offset"), Some(&63));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn log_backends_agree_on_contract() {
    let logs: Vec<Arc<dyn TopicLog>> = vec![
        Arc::new(MemoryLog::new()),
        Arc::new(KvLog::new(Arc::new(MemoryKv::new()), RetryPolicy::log_cas())),
    ];

    for log in logs {
        assert_eq!(log.append("k1", 123).await.expect("append"), 0);
        assert_eq!(log.append("k1", 321).await.expect("append"), 1);
        assert_eq!(log.append("k2", 1234).await.expect("append"), 0);

        assert_eq!(
            log.poll("k1", 1).await.expect("poll"),
            vec![LogEntry { offset: 1, value: 321 }]
        );
        assert!(log.poll("k1", 2).await.expect("poll").is_empty());

        assert_eq!(log.committed_offset("k1").await.expect("read"), None);
        log.commit("k1", 1).await.expect("commit");
        log.commit("k1", 0).await.expect("commit");
        assert_eq!(log.get_committed_offset("k1").await.expect("read"), 0);
        assert_eq!(log.get_committed_offset("k2").await.expect("read"), 0);
    }
}

struct NoPeers;

#[async_trait]
impl PeerTransport for NoPeers {
    fn peers(&self) -> Vec<String> {
        Vec::new()
    }

    async fn replicate(&self, _peer: &str, _writes: &[Op]) -> Result<(), RpcError> {
        Ok(())
    }
}

fn engine() -> Arc<TxnEngine> {
    Arc::new(TxnEngine::new(
        RetryPolicy::txn_locks(),
        Replicator::spawn(Arc::new(NoPeers), 16),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn held_key_blocks_only_its_own_txns() {
    let engine = engine();
    let held = engine
        .locks()
        .try_acquire(&[1], TxnId(u64::MAX))
        .expect("key 1 is free");

    let blocked = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.execute(vec![Op::read(1), Op::write(1, 11)]).await }
    });

    // A disjoint txn finishes while key 1 stays locked.
    let disjoint = timeout(Duration::from_secs(1), engine.execute(vec![Op::write(2, 22)]))
        .await
        .expect("disjoint txn is not blocked")
        .expect("txn");
    assert_eq!(disjoint, vec![Op::write(2, 22)]);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!blocked.is_finished());
    assert_eq!(engine.get(1), None);

    drop(held);
    let result = timeout(Duration::from_secs(2), blocked)
        .await
        .expect("txn resumes once key 1 is released")
        .expect("join")
        .expect("txn");
    assert_eq!(result, vec![Op::read(1), Op::write(1, 11)]);
    assert_eq!(engine.get(1), Some(11));
    assert!(engine.locks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn overlapping_txns_never_observe_partial_writes() {
    let engine = engine();

    // Writers keep keys 1 and 2 equal; readers must never see them differ.
    let writers = (0..50i64).map(|value| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .execute(vec![Op::write(1, value), Op::write(2, value)])
                .await
                .expect("write txn");
        })
    });
    let readers = (0..50).map(|_| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let result = engine
                .execute(vec![Op::read(2), Op::read(1)])
                .await
                .expect("read txn");
            match result.as_slice() {
                [Op::Read { value: a, .. }, Op::Read { value: b, .. }] => assert_eq!(a, b),
                other => panic!("unexpected result {other:?}"),
            }
        })
    });

    for joined in join_all(writers.chain(readers)).await {
        joined.expect("txn task");
    }
    assert_eq!(engine.get(1), engine.get(2));
}
