//! Best-effort propagation of committed writes to the rest of the cluster.
//!
//! Delivery is at most once: a batch is offered to every peer exactly one
//! time and failures are logged at debug level and forgotten. The replicator
//! holds at most `capacity` batches in flight plus `capacity` waiting in its
//! queue; anything offered beyond that is dropped. Shutting down abandons
//! whatever is in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::debug;

use super::{Op, TxnRequest};
use crate::error::RpcError;
use crate::message::Body;
use crate::node::Node;

/// Writes of one transaction, already deduplicated per key.
pub type ReplicationBatch = Arc<[Op]>;

/// How the replicator reaches other nodes.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Every node except the local one.
    fn peers(&self) -> Vec<String>;

    async fn replicate(&self, peer: &str, writes: &[Op]) -> Result<(), RpcError>;
}

/// Sends batches as write-only `txn` requests over the node's message bus.
pub struct ClusterTransport {
    node: Arc<Node>,
    timeout: Duration,
}

impl ClusterTransport {
    pub fn new(node: Arc<Node>, timeout: Duration) -> Self {
        Self { node, timeout }
    }
}

#[async_trait]
impl PeerTransport for ClusterTransport {
    fn peers(&self) -> Vec<String> {
        self.node.peers()
    }

    async fn replicate(&self, peer: &str, writes: &[Op]) -> Result<(), RpcError> {
        let body = Body::with_payload(
            "txn",
            &TxnRequest {
                txn: writes.to_vec(),
            },
        )?;
        self.node.rpc(peer, body, self.timeout).await?;
        Ok(())
    }
}

/// Owns the replication queue and the worker task draining it.
///
/// Must be created inside a tokio runtime.
pub struct Replicator {
    queue: mpsc::Sender<ReplicationBatch>,
    worker: JoinHandle<()>,
}

impl Replicator {
    /// `capacity` bounds both the queue and the batches sent but not yet
    /// answered by every peer.
    pub fn spawn(transport: Arc<dyn PeerTransport>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (queue, batches) = mpsc::channel(capacity);
        let worker = tokio::spawn(run_worker(transport, batches, capacity));
        Self { queue, worker }
    }

    /// Offers a batch for replication without waiting.
    ///
    /// Returns `false` if the batch was dropped because the queue is full or
    /// the worker has stopped.
    pub fn enqueue(&self, batch: ReplicationBatch) -> bool {
        match self.queue.try_send(batch) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(batch)) => {
                debug!(writes = batch.len(), "replication queue full, dropping batch");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Stops the worker. Calls already sent to peers are abandoned.
    pub fn shutdown(&self) {
        self.worker.abort();
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    transport: Arc<dyn PeerTransport>,
    mut batches: mpsc::Receiver<ReplicationBatch>,
    max_in_flight: usize,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            // While at the limit the queue is left to fill up, so `enqueue`
            // starts dropping.
            batch = batches.recv(), if in_flight.len() < max_in_flight => {
                let Some(batch) = batch else { break };
                in_flight.spawn(send_to_peers(Arc::clone(&transport), batch));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
    // Dropping the set aborts anything still in flight.
}

/// Offers one batch to every peer at once and waits for all of them.
async fn send_to_peers(transport: Arc<dyn PeerTransport>, batch: ReplicationBatch) {
    let mut calls = JoinSet::new();
    for peer in transport.peers() {
        let transport = Arc::clone(&transport);
        let batch = Arc::clone(&batch);
        calls.spawn(async move {
            match transport.replicate(&peer, &batch).await {
                Ok(()) => debug!(%peer, writes = batch.len(), "replicated batch"),
                Err(error) => debug!(%peer, %error, "replication failed, dropping batch"),
            }
        });
    }
    while calls.join_next().await.is_some() {}
}
