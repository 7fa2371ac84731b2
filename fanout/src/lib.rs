//! Single-producer, multi-consumer broadcast queue.
//!
//! One append-only log is fanned out to a fixed set of consumers. Each
//! consumer reads at its own pace and may bound its backlog, silently
//! dropping its own oldest unread entries. Entries are freed once every
//! consumer has moved past them.

pub mod core;
mod consumer;
mod errors;
mod producer;
mod queue;

pub use crate::consumer::Consumer;
pub use crate::core::{QueueConfig, DEFAULT_POLL_INTERVAL_NANOS};
pub use crate::errors::{QueueError, QueueResult};
pub use crate::producer::Producer;
pub use crate::queue::Queue;

#[cfg(test)]
mod tests;
