use std::fmt;
use std::sync::Arc;

use log::debug;

use super::consumer::Consumer;
use super::core::{QueueConfig, SharedLog};
use super::errors::{QueueError, QueueResult};
use super::producer::Producer;

/// A broadcast queue with one producer and a fixed set of consumers.
///
/// ```
/// use fanout::Queue;
///
/// # fn main() -> Result<(), fanout::QueueError> {
/// let queue = Queue::new(2)?;
/// queue.producer().append("hello");
/// assert_eq!(queue.consumer(0)?.pop(), "hello");
/// assert_eq!(queue.consumer(1)?.pop(), "hello");
/// # Ok(())
/// # }
/// ```
pub struct Queue<T> {
    log: Arc<SharedLog<T>>,
    producer: Producer<T>,
    consumers: Vec<Consumer<T>>,
}

impl<T> Queue<T> {
    pub fn new(consumers: usize) -> QueueResult<Queue<T>> {
        Queue::with_config(&QueueConfig::with_consumers(consumers))
    }

    pub fn with_config(cfg: &QueueConfig) -> QueueResult<Queue<T>> {
        if cfg.consumers == 0 {
            return Err(QueueError::InvalidArgument(
                "consumer count must be greater than 0".to_string(),
            ));
        }
        if cfg.backlog_limits.len() > cfg.consumers {
            return Err(QueueError::InvalidArgument(format!(
                "{} backlog limits given for {} consumers",
                cfg.backlog_limits.len(),
                cfg.consumers
            )));
        }

        let log = Arc::new(SharedLog::new(cfg.consumers));
        let consumers = (0..cfg.consumers)
            .map(|index| {
                Consumer::new(
                    index,
                    Arc::clone(&log),
                    cfg.backlog_limit(index),
                    cfg.poll_interval(),
                )
            })
            .collect();
        debug!(
            "queue created: consumers={}, backlog_limits={:?}, poll_interval={:?}",
            cfg.consumers,
            cfg.backlog_limits,
            cfg.poll_interval()
        );
        Ok(Queue {
            producer: Producer::new(Arc::clone(&log)),
            log,
            consumers,
        })
    }

    pub fn producer(&self) -> &Producer<T> {
        &self.producer
    }

    pub fn consumer(&self, index: usize) -> QueueResult<&Consumer<T>> {
        self.consumers.get(index).ok_or(QueueError::OutOfRange {
            index,
            count: self.consumers.len(),
        })
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// `size()` of every consumer, by index. Each call may apply that
    /// consumer's backlog limit.
    pub fn all_consumer_sizes(&self) -> Vec<usize> {
        self.consumers.iter().map(Consumer::size).collect()
    }

    /// Number of entries the shared log currently holds.
    pub fn retained(&self) -> usize {
        self.log.retained()
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("retained", &self.retained())
            .field("consumers", &self.consumers)
            .finish()
    }
}
