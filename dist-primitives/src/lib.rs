//! Distributed-systems primitives served by a cluster node over
//! newline-delimited JSON.
//!
//! A node reads messages from stdin and writes to stdout. After the `init`
//! handshake it serves one workload:
//!
//! - **kafka**: offset-addressed topic logs with committed offsets, kept
//!   either in memory or in the cluster's linearizable KV service
//! - **txn**: multi-key read/write transactions, locally serializable and
//!   replicated to peers on a best-effort basis
//! - **echo**, **unique-ids**, **broadcast**, **counter**: small services
//!
//! # Architecture
//!
//! The reader loop in [`runtime`] spawns a tokio task per request, so a
//! request stuck in a retry loop or waiting on a KV call never blocks the
//! others. All output goes through a single writer task. Calls to other nodes
//! and to KV services are correlated by `msg_id` in [`node`].
//!
//! # Modules
//!
//! - [`message`]: wire envelope and line codec
//! - [`error`]: wire error codes and the error types of each layer
//! - [`config`] / [`cli`]: node configuration and its command-line form
//! - [`node`]: identity, outbound messages, RPC correlation
//! - [`runtime`]: serve loop, [`runtime::Router`], [`runtime::Handler`]
//! - [`handlers`]: per-workload handlers and router construction
//! - [`kv`]: KV contract with in-memory and remote implementations
//! - [`log`]: topic log backends
//! - [`txn`]: transaction engine, lock table, replication
//! - [`services`]: broadcast message set and grow-only counter
//! - [`retry`]: exponential backoff with jitter

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod kv;
pub mod log;
pub mod message;
pub mod node;
pub mod retry;
pub mod runtime;
pub mod services;
pub mod txn;
