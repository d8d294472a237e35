use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::KvStore;
use crate::error::{ErrorCode, KvError, RpcError};
use crate::message::Body;
use crate::node::Node;

/// Client for a KV service reachable over the cluster's message bus
/// (`lin-kv`, `seq-kv`, ...). Every call is bounded by `timeout`.
pub struct RemoteKv {
    node: Arc<Node>,
    service: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ReadRequest<'a> {
    key: &'a str,
}

#[derive(Deserialize)]
struct ReadReply {
    value: i64,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    key: &'a str,
    value: i64,
}

#[derive(Serialize)]
struct CasRequest<'a> {
    key: &'a str,
    from: i64,
    to: i64,
    create_if_not_exists: bool,
}

impl RemoteKv {
    pub fn new(node: Arc<Node>, service: impl Into<String>, timeout: Duration) -> Self {
        Self {
            node,
            service: service.into(),
            timeout,
        }
    }

    async fn call(&self, key: &str, body: Result<Body, RpcError>) -> Result<Body, KvError> {
        let body = body.map_err(KvError::Rpc)?;
        let kind = body.kind.clone();
        self.node
            .rpc(&self.service, body, self.timeout)
            .await
            .map_err(|err| {
                debug!(service = %self.service, key, op = %kind, error = %err, "kv call failed");
                KvError::from_rpc(key, err)
            })
    }
}

#[async_trait]
impl KvStore for RemoteKv {
    async fn read(&self, key: &str) -> Result<i64, KvError> {
        let reply = self
            .call(key, Body::with_payload("read", &ReadRequest { key }))
            .await?;
        let ReadReply { value } = reply.decode().map_err(|err| {
            KvError::Rpc(RpcError::new(
                ErrorCode::MalformedRequest,
                format!("{} returned a non-integer for '{key}': {}", self.service, err.text),
            ))
        })?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: i64) -> Result<(), KvError> {
        self.call(key, Body::with_payload("write", &WriteRequest { key, value }))
            .await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        from: i64,
        to: i64,
        create_if_missing: bool,
    ) -> Result<(), KvError> {
        let request = CasRequest {
            key,
            from,
            to,
            create_if_not_exists: create_if_missing,
        };
        self.call(key, Body::with_payload("cas", &request)).await?;
        Ok(())
    }
}
