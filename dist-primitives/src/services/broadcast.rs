use std::sync::{Mutex, PoisonError};

/// Messages received through `broadcast`, in arrival order.
///
/// Nothing is gossiped to other nodes.
#[derive(Debug, Default)]
pub struct MessageSet {
    messages: Mutex<Vec<i64>>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, message: i64) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// A copy of everything stored so far.
    pub fn read(&self) -> Vec<i64> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
