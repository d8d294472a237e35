//! A cluster member's identity and its outbound side of the wire.
//!
//! A [`Node`] is created once the `init` message names this process and its
//! peers. It hands every outgoing message to the writer task through an
//! unbounded channel and correlates RPC replies by `msg_id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{ErrorCode, RpcError};
use crate::message::{Body, Message};

/// Items consumed by the writer task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Message(Message),
    /// Everything queued before this has been written; stop.
    Close,
}

pub struct Node {
    id: String,
    node_ids: Vec<String>,
    next_msg_id: AtomicU64,
    outbox: mpsc::UnboundedSender<Outbound>,
    /// Outstanding RPCs keyed by the `msg_id` we sent them with.
    pending: Mutex<HashMap<u64, oneshot::Sender<Body>>>,
}

impl Node {
    pub(crate) fn new(
        id: String,
        node_ids: Vec<String>,
        outbox: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id,
            node_ids,
            next_msg_id: AtomicU64::new(1),
            outbox,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Every member of the cluster, this node included.
    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    /// Every member of the cluster except this node.
    pub fn peers(&self) -> Vec<String> {
        self.node_ids
            .iter()
            .filter(|id| **id != self.id)
            .cloned()
            .collect()
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.node_ids.iter().any(|id| id == name)
    }

    /// Sends a request and waits up to `timeout` for its reply.
    ///
    /// An `error` reply is returned as `Err`. Dropping the returned future
    /// forgets the request; a reply arriving afterwards is discarded.
    pub async fn rpc(&self, dest: &str, mut body: Body, timeout: Duration) -> Result<Body, RpcError> {
        let msg_id = self.next_msg_id();
        body.msg_id = Some(msg_id);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending().insert(msg_id, reply_tx);
        let _pending = PendingReply { node: self, msg_id };

        self.emit(dest, body);

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => match reply.as_error() {
                Some(err) => Err(err),
                None => Ok(reply),
            },
            Ok(Err(_)) => Err(RpcError::new(
                ErrorCode::Crash,
                format!("reply slot for {dest} dropped"),
            )),
            Err(_) => Err(RpcError::timeout(format!(
                "no reply from {dest} within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Answers `request`, linking the reply through `in_reply_to`.
    pub fn reply(&self, request: &Message, mut body: Body) {
        body.in_reply_to = request.body.msg_id;
        body.msg_id = Some(self.next_msg_id());
        self.emit(&request.src, body);
    }

    /// Hands a reply to the RPC waiting for it.
    ///
    /// Returns `false` when nobody is waiting, e.g. the caller already timed out.
    pub(crate) fn complete(&self, reply: Body) -> bool {
        let Some(msg_id) = reply.in_reply_to else {
            return false;
        };
        match self.pending().remove(&msg_id) {
            Some(waiter) => waiter.send(reply).is_ok(),
            None => false,
        }
    }

    fn emit(&self, dest: &str, body: Body) {
        let message = Message {
            src: self.id.clone(),
            dest: dest.to_string(),
            body,
        };
        if self.outbox.send(Outbound::Message(message)).is_err() {
            debug!(node = %self.id, dest, "writer closed, dropping outbound message");
        }
    }

    fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Body>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes an RPC's reply slot when the waiting future finishes or is dropped.
struct PendingReply<'a> {
    node: &'a Node,
    msg_id: u64,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        self.node.pending().remove(&self.msg_id);
    }
}
