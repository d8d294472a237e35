//! The node's event loop.
//!
//! [`serve`] reads newline-delimited messages from `reader` and writes
//! replies to `writer`:
//!
//! - **Reader loop** (the caller's task): waits for `init`, then routes every
//!   reply to the RPC waiting for it and spawns a task for every request.
//! - **Request tasks**: one per inbound request, so a request blocked on a
//!   retry loop or a KV call never holds up the others.
//! - **Writer task**: the only place that touches `writer`; everything else
//!   queues outbound messages on an unbounded channel.
//!
//! On end of input the loop waits for in-flight requests, shuts the
//! handlers down, and lets the writer flush what was queued before exiting.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, RpcError};
use crate::message::{Body, Message, read_message, write_message};
use crate::node::{Node, Outbound};

/// Serves one family of message types.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produces the reply body for `request`; errors become `error` replies.
    async fn handle(&self, node: &Node, request: &Message) -> Result<Body, RpcError>;

    /// Called once when the node stops reading input.
    fn shutdown(&self) {}
}

/// Maps message types to handlers.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Handler>>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends every message whose type is in `kinds` to `handler`.
    pub fn route(mut self, kinds: &[&str], handler: Arc<dyn Handler>) -> Self {
        for kind in kinds {
            self.routes.insert((*kind).to_string(), Arc::clone(&handler));
        }
        self.handlers.push(handler);
        self
    }

    /// Runs the matching handler and replies to the sender.
    pub async fn dispatch(&self, node: &Node, request: Message) {
        let kind = request.body.kind.as_str();
        let result = match self.routes.get(kind) {
            Some(handler) => handler.handle(node, &request).await,
            None => Err(RpcError::not_supported(kind)),
        };

        let body = match result {
            Ok(body) => body,
            Err(err) => {
                warn!(src = %request.src, kind, error = %err, "request failed");
                Body::error(&err)
            }
        };

        if request.body.msg_id.is_none() {
            debug!(src = %request.src, kind, "request has no msg_id, not replying");
            return;
        }
        node.reply(&request, body);
    }

    fn shutdown(&self) {
        for handler in &self.handlers {
            handler.shutdown();
        }
    }
}

#[derive(Deserialize)]
struct InitRequest {
    node_id: String,
    node_ids: Vec<String>,
}

/// Runs a node until `reader` reaches end of input.
///
/// `build` is called once, right after `init`, with the now-identified node;
/// the router it returns serves every later request.
pub async fn serve<R, W, F>(mut reader: R, writer: W, build: F) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(Arc<Node>) -> Router,
{
    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_outbox(writer, outbox_rx));

    let result = match wait_for_init(&mut reader, &outbox).await {
        Ok(Some(node)) => {
            let node = Arc::new(node);
            info!(node = %node.id(), cluster = ?node.node_ids(), "node initialized");
            let router = Arc::new(build(Arc::clone(&node)));
            let result = serve_requests(&mut reader, &node, &router).await;
            router.shutdown();
            info!(node = %node.id(), "input closed, node stopped");
            result
        }
        Ok(None) => {
            info!("input closed before init");
            Ok(())
        }
        Err(err) => Err(err),
    };

    let _ = outbox.send(Outbound::Close);
    writer_task
        .await
        .context("writer task panicked")?
        .context("failed to write to output")?;
    result
}

/// Reads until an `init` arrives and answers it.
///
/// Anything else received first is rejected, since no service exists yet.
async fn wait_for_init<R>(
    reader: &mut R,
    outbox: &mpsc::UnboundedSender<Outbound>,
) -> Result<Option<Node>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(message) = next_message(reader).await? {
        if message.body.kind != "init" {
            warn!(src = %message.src, kind = %message.body.kind, "message before init");
            let err = RpcError::new(ErrorCode::TemporarilyUnavailable, "node not initialized yet");
            reply_before_init(outbox, &message, Body::error(&err));
            continue;
        }

        let init: InitRequest = match message.body.decode() {
            Ok(init) => init,
            Err(err) => {
                warn!(src = %message.src, error = %err, "malformed init");
                reply_before_init(outbox, &message, Body::error(&err));
                continue;
            }
        };

        let node = Node::new(init.node_id, init.node_ids, outbox.clone());
        node.reply(&message, Body::new("init_ok"));
        return Ok(Some(node));
    }
    Ok(None)
}

async fn serve_requests<R>(reader: &mut R, node: &Arc<Node>, router: &Arc<Router>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut requests = JoinSet::new();
    let read_result = loop {
        let message = match next_message(reader).await {
            Ok(Some(message)) => message,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };

        if message.body.in_reply_to.is_some() {
            let src = message.src.clone();
            if !node.complete(message.body) {
                debug!(%src, "dropping reply nobody is waiting for");
            }
            continue;
        }

        let node = Arc::clone(node);
        let router = Arc::clone(router);
        requests.spawn(async move { router.dispatch(&node, message).await });

        while let Some(finished) = requests.try_join_next() {
            log_request_panic(finished);
        }
    };

    while let Some(finished) = requests.join_next().await {
        log_request_panic(finished);
    }
    read_result
}

/// Reads the next well-formed message, skipping lines that are not one.
async fn next_message<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_message::<_, Message>(reader).await {
            Ok(message) => return Ok(message),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %err, "skipping malformed input line");
            }
            Err(err) => return Err(err).context("failed to read input"),
        }
    }
}

fn reply_before_init(outbox: &mpsc::UnboundedSender<Outbound>, request: &Message, mut body: Body) {
    body.in_reply_to = request.body.msg_id;
    let reply = Message {
        src: request.dest.clone(),
        dest: request.src.clone(),
        body,
    };
    let _ = outbox.send(Outbound::Message(reply));
}

fn log_request_panic(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = finished {
        warn!(error = %err, "request task panicked");
    }
}

async fn write_outbox<W>(mut writer: W, mut outbox: mpsc::UnboundedReceiver<Outbound>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = outbox.recv().await {
        match item {
            Outbound::Message(message) => write_message(&mut writer, &message).await?,
            Outbound::Close => break,
        }
    }
    Ok(())
}
