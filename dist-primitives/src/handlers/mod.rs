//! Message handlers, one module per workload.
//!
//! [`build_router`] wires the selected workload's services to the message
//! types they serve. It runs once, right after `init`, so services that need
//! the node (KV clients, the replicator) can be constructed with it.

mod basic;
mod kafka;
mod txn;

pub use basic::{BroadcastHandler, CounterHandler, EchoHandler, GenerateHandler};
pub use kafka::KafkaHandler;
pub use txn::TxnHandler;

use std::sync::Arc;

use crate::config::{LogBackendKind, NodeConfig, Workload};
use crate::kv::RemoteKv;
use crate::log::{KvLog, MemoryLog, TopicLog};
use crate::node::Node;
use crate::runtime::Router;
use crate::services::{Counter, MessageSet};
use crate::txn::{ClusterTransport, Replicator, TxnEngine};

pub fn build_router(config: &NodeConfig, node: Arc<Node>) -> Router {
    let router = Router::new();
    match config.workload {
        Workload::Echo => router.route(&["echo"], Arc::new(EchoHandler)),
        Workload::UniqueIds => router.route(&["generate"], Arc::new(GenerateHandler)),
        Workload::Broadcast => router.route(
            &["broadcast", "read", "topology"],
            Arc::new(BroadcastHandler::new(MessageSet::new())),
        ),
        Workload::Counter => {
            let kv = RemoteKv::new(node, config.counter_kv_service.clone(), config.kv_timeout);
            let counter = Counter::new(Arc::new(kv), config.log_retry);
            router.route(&["add", "read"], Arc::new(CounterHandler::new(counter)))
        }
        Workload::Kafka => {
            let log: Arc<dyn TopicLog> = match config.log_backend {
                LogBackendKind::Memory => Arc::new(MemoryLog::new()),
                LogBackendKind::Kv => {
                    let kv = RemoteKv::new(node, config.log_kv_service.clone(), config.kv_timeout);
                    Arc::new(KvLog::new(Arc::new(kv), config.log_retry))
                }
            };
            router.route(
                &["send", "poll", "commit_offsets", "list_committed_offsets"],
                Arc::new(KafkaHandler::new(log)),
            )
        }
        Workload::Txn => {
            let transport = ClusterTransport::new(node, config.replication_timeout);
            let replicator = Replicator::spawn(Arc::new(transport), config.replication_queue);
            let engine = TxnEngine::new(config.txn_retry, replicator);
            router.route(&["txn"], Arc::new(TxnHandler::new(engine)))
        }
    }
}
