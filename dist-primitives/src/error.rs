//! Error types for the node, its KV client and the storage engines.
//!
//! Contention (CAS precondition failures, held locks) is retried inside the
//! engines and never reaches these types unless a bounded retry policy runs
//! out. What does escape is turned into an [`RpcError`] for the wire.

use std::fmt;

use thiserror::Error;

/// Error codes understood by every participant on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Timeout,
    NodeNotFound,
    NotSupported,
    TemporarilyUnavailable,
    MalformedRequest,
    Crash,
    Abort,
    KeyDoesNotExist,
    KeyAlreadyExists,
    PreconditionFailed,
    TxnConflict,
    Other(u16),
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::Timeout => 0,
            ErrorCode::NodeNotFound => 1,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::KeyDoesNotExist => 20,
            ErrorCode::KeyAlreadyExists => 21,
            ErrorCode::PreconditionFailed => 22,
            ErrorCode::TxnConflict => 30,
            ErrorCode::Other(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => ErrorCode::Timeout,
            1 => ErrorCode::NodeNotFound,
            10 => ErrorCode::NotSupported,
            11 => ErrorCode::TemporarilyUnavailable,
            12 => ErrorCode::MalformedRequest,
            13 => ErrorCode::Crash,
            14 => ErrorCode::Abort,
            20 => ErrorCode::KeyDoesNotExist,
            21 => ErrorCode::KeyAlreadyExists,
            22 => ErrorCode::PreconditionFailed,
            30 => ErrorCode::TxnConflict,
            other => ErrorCode::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Timeout => "timeout",
            ErrorCode::NodeNotFound => "node-not-found",
            ErrorCode::NotSupported => "not-supported",
            ErrorCode::TemporarilyUnavailable => "temporarily-unavailable",
            ErrorCode::MalformedRequest => "malformed-request",
            ErrorCode::Crash => "crash",
            ErrorCode::Abort => "abort",
            ErrorCode::KeyDoesNotExist => "key-does-not-exist",
            ErrorCode::KeyAlreadyExists => "key-already-exists",
            ErrorCode::PreconditionFailed => "precondition-failed",
            ErrorCode::TxnConflict => "txn-conflict",
            ErrorCode::Other(code) => return write!(f, "error-{code}"),
        };
        f.write_str(name)
    }
}

/// An error as carried in an `error` body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} ({}): {text}", .code.as_u16())]
pub struct RpcError {
    pub code: ErrorCode,
    pub text: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn timeout(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, text)
    }

    pub fn not_supported(kind: &str) -> Self {
        Self::new(ErrorCode::NotSupported, format!("unsupported message type '{kind}'"))
    }
}

/// Failures of the linearizable (or sequential) key-value contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("key '{key}' does not exist")]
    NotFound { key: String },

    #[error("precondition failed for key '{key}'")]
    PreconditionFailed { key: String },

    #[error("kv call on '{key}' timed out")]
    Timeout { key: String },

    #[error("kv call failed: {0}")]
    Rpc(RpcError),
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound { .. })
    }

    /// Maps a KV service error reply onto the contract's error kinds.
    pub fn from_rpc(key: &str, err: RpcError) -> Self {
        match err.code {
            ErrorCode::KeyDoesNotExist => KvError::NotFound { key: key.to_string() },
            ErrorCode::PreconditionFailed => KvError::PreconditionFailed { key: key.to_string() },
            ErrorCode::Timeout => KvError::Timeout { key: key.to_string() },
            _ => KvError::Rpc(err),
        }
    }
}

impl From<KvError> for RpcError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::NotFound { key } => {
                RpcError::new(ErrorCode::KeyDoesNotExist, format!("key '{key}' does not exist"))
            }
            KvError::PreconditionFailed { key } => RpcError::new(
                ErrorCode::PreconditionFailed,
                format!("precondition failed for key '{key}'"),
            ),
            KvError::Timeout { key } => RpcError::timeout(format!("kv call on '{key}' timed out")),
            KvError::Rpc(err) => err,
        }
    }
}

/// Failures of the CAS-based structures: the topic log and the counter.
#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("gave up on '{key}' after {attempts} compare-and-swap attempts")]
    RetriesExhausted { key: String, attempts: u32 },

    #[error("adding {delta} to '{key}' ({current}) overflows")]
    Overflow { key: String, current: i64, delta: i64 },
}

impl From<LogError> for RpcError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Kv(err) => err.into(),
            err @ LogError::RetriesExhausted { .. } => {
                RpcError::new(ErrorCode::TemporarilyUnavailable, err.to_string())
            }
            err @ LogError::Overflow { .. } => {
                RpcError::new(ErrorCode::MalformedRequest, err.to_string())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum TxnError {
    #[error("could not lock keys {keys:?} after {attempts} attempts")]
    LockContention { keys: Vec<i64>, attempts: u32 },
}

impl From<TxnError> for RpcError {
    fn from(err: TxnError) -> Self {
        RpcError::new(ErrorCode::TxnConflict, err.to_string())
    }
}
