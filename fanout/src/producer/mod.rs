use std::fmt;
use std::sync::Arc;

use super::core::SharedLog;

/// The single write endpoint of a [`Queue`](crate::Queue).
///
/// Appends from any number of threads are serialized with each other and
/// with reclamation of entries every consumer has moved past.
pub struct Producer<T> {
    log: Arc<SharedLog<T>>,
}

impl<T> Producer<T> {
    pub(crate) fn new(log: Arc<SharedLog<T>>) -> Producer<T> {
        Producer { log }
    }

    pub fn append(&self, value: T) {
        self.log.append(value)
    }

    /// Appends every value in order without letting other appenders in
    /// between. Reclamation still runs after each entry.
    ///
    /// The iterator is drained before the log is locked, so it may read
    /// from the same queue.
    pub fn append_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.log.append_all(values)
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("retained", &self.log.retained())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_log_while_no_consumer_moves() {
        let log = Arc::new(SharedLog::new(2));
        let producer = Producer::new(Arc::clone(&log));
        for i in 0..100 {
            producer.append(i);
        }
        assert_eq!(log.retained(), 100);
    }

    #[test]
    fn append_all_keeps_order() {
        let log = Arc::new(SharedLog::new(1));
        let producer = Producer::new(Arc::clone(&log));
        producer.append(0);
        producer.append_all(1..5);
        let store = log.read();
        let values: Vec<i32> = (0..store.end())
            .filter_map(|i| store.get(i).copied())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }
}
