use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::log::{LogEntry, TopicLog};
use crate::message::{Body, Message};
use crate::node::Node;
use crate::runtime::Handler;

#[derive(Deserialize)]
struct SendRequest {
    key: String,
    msg: i64,
}

#[derive(Serialize)]
struct SendReply {
    offset: u64,
}

#[derive(Deserialize)]
struct PollRequest {
    offsets: BTreeMap<String, u64>,
}

#[derive(Serialize)]
struct PollReply {
    msgs: BTreeMap<String, Vec<LogEntry>>,
}

/// Body of `commit_offsets` and of the `list_committed_offsets_ok` reply.
#[derive(Serialize, Deserialize)]
struct Offsets {
    offsets: BTreeMap<String, u64>,
}

#[derive(Deserialize)]
struct ListCommittedRequest {
    keys: Vec<String>,
}

/// Exposes a [`TopicLog`] through the `send`/`poll`/`commit_offsets`/
/// `list_committed_offsets` messages.
pub struct KafkaHandler {
    log: Arc<dyn TopicLog>,
}

impl KafkaHandler {
    pub fn new(log: Arc<dyn TopicLog>) -> Self {
        Self { log }
    }

    async fn send(&self, request: &Message) -> Result<Body, RpcError> {
        let SendRequest { key, msg } = request.body.decode()?;
        let offset = self.log.append(&key, msg).await?;
        Body::with_payload("send_ok", &SendReply { offset })
    }

    async fn poll(&self, request: &Message) -> Result<Body, RpcError> {
        let PollRequest { offsets } = request.body.decode()?;
        let mut msgs = BTreeMap::new();
        for (topic, from) in offsets {
            let entries = self.log.poll(&topic, from).await?;
            if !entries.is_empty() {
                msgs.insert(topic, entries);
            }
        }
        Body::with_payload("poll_ok", &PollReply { msgs })
    }

    async fn commit_offsets(&self, request: &Message) -> Result<Body, RpcError> {
        let Offsets { offsets } = request.body.decode()?;
        for (topic, offset) in offsets {
            self.log.commit(&topic, offset).await?;
        }
        Ok(Body::new("commit_offsets_ok"))
    }

    async fn list_committed_offsets(&self, request: &Message) -> Result<Body, RpcError> {
        let ListCommittedRequest { keys } = request.body.decode()?;
        let mut offsets = BTreeMap::new();
        for topic in keys {
            if let Some(offset) = self.log.committed_offset(&topic).await? {
                offsets.insert(topic, offset);
            }
        }
        Body::with_payload("list_committed_offsets_ok", &Offsets { offsets })
    }
}

#[async_trait]
impl Handler for KafkaHandler {
    async fn handle(&self, _node: &Node, request: &Message) -> Result<Body, RpcError> {
        match request.body.kind.as_str() {
            "send" => self.send(request).await,
            "poll" => self.poll(request).await,
            "commit_offsets" => self.commit_offsets(request).await,
            "list_committed_offsets" => self.list_committed_offsets(request).await,
            other => Err(RpcError::not_supported(other)),
        }
    }
}
