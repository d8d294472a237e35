use async_trait::async_trait;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::kv::KvStore;
use crate::message::{Body, Message};
use crate::node::Node;
use crate::runtime::Handler;
use crate::services::{Counter, MessageSet};

/// `echo` → `echo_ok` with the request's fields copied back.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, _node: &Node, request: &Message) -> Result<Body, RpcError> {
        Ok(Body {
            fields: request.body.fields.clone(),
            ..Body::new("echo_ok")
        })
    }
}

#[derive(Serialize)]
struct Generated {
    id: String,
}

/// `generate` → `generate_ok` with an id no other node can produce.
pub struct GenerateHandler;

#[async_trait]
impl Handler for GenerateHandler {
    async fn handle(&self, node: &Node, _request: &Message) -> Result<Body, RpcError> {
        let id = format!("{}-{}", node.id(), nanoid!());
        Body::with_payload("generate_ok", &Generated { id })
    }
}

#[derive(Deserialize)]
struct BroadcastRequest {
    message: i64,
}

#[derive(Serialize)]
struct Messages {
    messages: Vec<i64>,
}

/// Serves `broadcast`, `read` and `topology` from a local [`MessageSet`].
pub struct BroadcastHandler {
    messages: MessageSet,
}

impl BroadcastHandler {
    pub fn new(messages: MessageSet) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl Handler for BroadcastHandler {
    async fn handle(&self, _node: &Node, request: &Message) -> Result<Body, RpcError> {
        match request.body.kind.as_str() {
            "broadcast" => {
                let BroadcastRequest { message } = request.body.decode()?;
                self.messages.store(message);
                Ok(Body::new("broadcast_ok"))
            }
            "read" => Body::with_payload(
                "read_ok",
                &Messages {
                    messages: self.messages.read(),
                },
            ),
            "topology" => Ok(Body::new("topology_ok")),
            other => Err(RpcError::not_supported(other)),
        }
    }
}

#[derive(Deserialize)]
struct AddRequest {
    delta: i64,
}

#[derive(Serialize)]
struct CounterValue {
    value: i64,
}

/// Serves `add` and `read` from a KV-backed [`Counter`].
pub struct CounterHandler<K: KvStore + ?Sized> {
    counter: Counter<K>,
}

impl<K: KvStore + ?Sized> CounterHandler<K> {
    pub fn new(counter: Counter<K>) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl<K: KvStore + ?Sized + 'static> Handler for CounterHandler<K> {
    async fn handle(&self, _node: &Node, request: &Message) -> Result<Body, RpcError> {
        match request.body.kind.as_str() {
            "add" => {
                let AddRequest { delta } = request.body.decode()?;
                self.counter.add(delta).await?;
                Ok(Body::new("add_ok"))
            }
            "read" => {
                let value = self.counter.read().await?;
                Body::with_payload("read_ok", &CounterValue { value })
            }
            other => Err(RpcError::not_supported(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::ErrorCode;
    use crate::kv::MemoryKv;

    fn node(id: &str) -> Node {
        let (outbox, _rx) = mpsc::unbounded_channel();
        Node::new(id.to_string(), vec![id.to_string()], outbox)
    }

    fn request(body: serde_json::Value) -> Message {
        Message {
            src: "c1".into(),
            dest: "n1".into(),
            body: serde_json::from_value(body).expect("body"),
        }
    }

    #[tokio::test]
    async fn echo_copies_fields() {
        let reply = EchoHandler
            .handle(&node("n1"), &request(json!({"type": "echo", "msg_id": 1, "echo": "hello"})))
            .await
            .expect("echo");
        assert_eq!(reply.kind, "echo_ok");
        assert_eq!(reply.fields.get("echo"), Some(&json!("hello")));
    }

    #[tokio::test]
    async fn generated_ids_are_prefixed_and_distinct() {
        let node = node("n3");
        let generate = request(json!({"type": "generate", "msg_id": 1}));

        let mut ids = Vec::new();
        for _ in 0..50 {
            let reply = GenerateHandler.handle(&node, &generate).await.expect("generate");
            let id = reply.fields["id"].as_str().expect("string id").to_string();
            assert!(id.starts_with("n3-"), "{id}");
            ids.push(id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn broadcast_then_read() {
        let handler = BroadcastHandler::new(MessageSet::new());
        let node = node("n1");

        for message in [4, 9] {
            let reply = handler
                .handle(&node, &request(json!({"type": "broadcast", "msg_id": 1, "message": message})))
                .await
                .expect("broadcast");
            assert_eq!(reply.kind, "broadcast_ok");
        }
        let topology = json!({"type": "topology", "msg_id": 2, "topology": {"n1": []}});
        assert_eq!(handler.handle(&node, &request(topology)).await.expect("topology").kind, "topology_ok");

        let read = handler
            .handle(&node, &request(json!({"type": "read", "msg_id": 3})))
            .await
            .expect("read");
        assert_eq!(read.fields.get("messages"), Some(&json!([4, 9])));
    }

    #[tokio::test]
    async fn broadcast_without_message_is_malformed() {
        let handler = BroadcastHandler::new(MessageSet::new());
        let err = handler
            .handle(&node("n1"), &request(json!({"type": "broadcast", "msg_id": 1})))
            .await
            .expect_err("missing message");
        assert_eq!(err.code, ErrorCode::MalformedRequest);
    }

    #[tokio::test]
    async fn counter_adds_up() {
        let handler = CounterHandler::new(Counter::new(Arc::new(MemoryKv::new()), RetryPolicy::log_cas()));
        let node = node("n1");

        for delta in [2, 5] {
            let reply = handler
                .handle(&node, &request(json!({"type": "add", "msg_id": 1, "delta": delta})))
                .await
                .expect("add");
            assert_eq!(reply.kind, "add_ok");
        }
        let read = handler
            .handle(&node, &request(json!({"type": "read", "msg_id": 2})))
            .await
            .expect("read");
        assert_eq!(read.fields.get("value"), Some(&json!(7)));
    }
}
