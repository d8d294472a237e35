//! Small services that round out a node: a broadcast message set and a
//! grow-only counter.

mod broadcast;
mod counter;

pub use broadcast::MessageSet;
pub use counter::Counter;
