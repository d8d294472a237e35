use serde::{Deserialize, Serialize};

/// The wire form of an operation: `[mode, key, value-or-null]`.
type RawOp = (String, i64, Option<i64>);

/// One step of a transaction.
///
/// A read's `value` is `None` in requests and is filled in (or left `None`
/// for a key never written) in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOp", into = "RawOp")]
pub enum Op {
    Read { key: i64, value: Option<i64> },
    Write { key: i64, value: i64 },
}

impl Op {
    pub fn read(key: i64) -> Self {
        Op::Read { key, value: None }
    }

    pub fn write(key: i64, value: i64) -> Self {
        Op::Write { key, value }
    }

    pub fn key(&self) -> i64 {
        match self {
            Op::Read { key, .. } | Op::Write { key, .. } => *key,
        }
    }
}

impl TryFrom<RawOp> for Op {
    type Error = String;

    fn try_from((mode, key, value): RawOp) -> Result<Self, Self::Error> {
        match (mode.as_str(), value) {
            ("r", value) => Ok(Op::Read { key, value }),
            ("w", Some(value)) => Ok(Op::Write { key, value }),
            ("w", None) => Err(format!("write to key {key} has no value")),
            (other, _) => Err(format!("unknown operation mode '{other}'")),
        }
    }
}

impl From<Op> for RawOp {
    fn from(op: Op) -> Self {
        match op {
            Op::Read { key, value } => ("r".to_string(), key, value),
            Op::Write { key, value } => ("w".to_string(), key, Some(value)),
        }
    }
}
