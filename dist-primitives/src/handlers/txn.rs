use async_trait::async_trait;
use tracing::debug;

use crate::error::RpcError;
use crate::message::{Body, Message};
use crate::node::Node;
use crate::runtime::Handler;
use crate::txn::{TxnEngine, TxnRequest};

/// Serves `txn` for clients and applies batches replicated by peers.
pub struct TxnHandler {
    engine: TxnEngine,
}

impl TxnHandler {
    pub fn new(engine: TxnEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TxnEngine {
        &self.engine
    }
}

#[async_trait]
impl Handler for TxnHandler {
    async fn handle(&self, node: &Node, request: &Message) -> Result<Body, RpcError> {
        let TxnRequest { txn } = request.body.decode()?;

        if node.is_member(&request.src) {
            debug!(src = %request.src, writes = txn.len(), "applying replicated writes");
            self.engine.apply_replicated(&txn);
            return Body::with_payload("txn_ok", &TxnRequest { txn });
        }

        let txn = self.engine.execute(txn).await?;
        Body::with_payload("txn_ok", &TxnRequest { txn })
    }

    fn shutdown(&self) {
        self.engine.shutdown();
    }
}
