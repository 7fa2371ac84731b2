use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::debug;

use super::core::{SharedLog, Store};

/// Where a consumer's read reference points, as a logical index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Position {
    /// Nothing has been appended since the consumer was created.
    Unpositioned,
    /// The next entry to read.
    Positioned(usize),
    /// The tail entry, already consumed. Stays put until an entry exists
    /// beyond it; reclamation keeps it alive.
    Stagnated(usize),
}

impl Position {
    #[inline]
    fn next_entry(self) -> Option<usize> {
        match self {
            Position::Unpositioned => None,
            Position::Positioned(at) => Some(at),
            Position::Stagnated(at) => Some(at + 1),
        }
    }

    #[inline]
    fn skip(&mut self, count: usize) {
        match self {
            Position::Unpositioned => {}
            Position::Positioned(at) | Position::Stagnated(at) => *at += count,
        }
    }
}

/// One independent read endpoint of a [`Queue`](crate::Queue).
///
/// Every consumer sees every appended entry in order, except the ones its
/// own backlog limit drops. Several threads may share one consumer; each
/// entry is then handed to exactly one of them.
pub struct Consumer<T> {
    index: usize,
    log: Arc<SharedLog<T>>,
    backlog_limit: AtomicUsize,
    position: Mutex<Position>,
    poll_interval: Duration,
}

impl<T> Consumer<T> {
    pub(crate) fn new(
        index: usize,
        log: Arc<SharedLog<T>>,
        backlog_limit: usize,
        poll_interval: Duration,
    ) -> Consumer<T> {
        Consumer {
            index,
            log,
            backlog_limit: AtomicUsize::new(backlog_limit),
            position: Mutex::new(Position::Unpositioned),
            poll_interval,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Maximum number of unread entries kept for this consumer. `0` means
    /// unbounded.
    pub fn backlog_limit(&self) -> usize {
        self.backlog_limit.load(Ordering::Relaxed)
    }

    /// Takes effect on the next `size` or `pop`. Entries already dropped
    /// are not recovered by raising the limit.
    pub fn set_backlog_limit(&self, limit: usize) {
        self.backlog_limit.store(limit, Ordering::Relaxed)
    }

    /// Number of entries this consumer can still pop.
    ///
    /// Applies the backlog limit first, so this may drop the oldest unread
    /// entries.
    pub fn size(&self) -> usize {
        let mut position = self.lock_position();
        let store = self.log.read();
        self.fit_backlog(&mut position, &store)
    }

    #[inline]
    fn lock_position(&self) -> MutexGuard<'_, Position> {
        // The position is written only after the entry has been cloned.
        self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Positions the read reference on first use and drops whatever exceeds
    /// the backlog limit. Returns the visible backlog.
    ///
    /// Must be called with the store read lock held: the cursor is moved
    /// here and reclamation shifts it under the write lock.
    fn fit_backlog(&self, position: &mut Position, store: &Store<T>) -> usize {
        let cursor = self.log.cursor(self.index);
        let current = cursor.load(Ordering::Acquire);

        if *position == Position::Unpositioned {
            if store.is_empty() {
                return 0;
            }
            *position = Position::Positioned(store.head() + current);
        }

        let backlog = store.len() - current;
        let limit = self.backlog_limit();
        if limit == 0 || backlog <= limit {
            return backlog;
        }

        let excess = backlog - limit;
        cursor.fetch_add(excess, Ordering::AcqRel);
        position.skip(excess);
        debug!(
            "consumer {} dropped {} entries over backlog limit {}",
            self.index, excess, limit
        );
        limit
    }

    #[inline]
    fn wait(&self) {
        if self.poll_interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.poll_interval);
        }
    }
}

impl<T: Clone> Consumer<T> {
    /// Blocks until an entry is visible, then returns it.
    ///
    /// Waiting is a polling loop; the consumer is not locked between polls,
    /// so `size` and other poppers stay responsive.
    pub fn pop(&self) -> T {
        loop {
            if let Some(value) = self.try_pop() {
                return value;
            }
            self.wait();
        }
    }

    /// Returns the next visible entry, or `None` if there is none yet.
    pub fn try_pop(&self) -> Option<T> {
        let mut position = self.lock_position();
        let store = self.log.read();
        if self.fit_backlog(&mut position, &store) == 0 {
            return None;
        }

        let at = position.next_entry()?;
        let value = store.get(at)?.clone();
        *position = if at + 1 == store.end() {
            Position::Stagnated(at)
        } else {
            Position::Positioned(at + 1)
        };
        self.log.cursor(self.index).fetch_add(1, Ordering::AcqRel);
        Some(value)
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("index", &self.index)
            .field("backlog_limit", &self.backlog_limit())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer_over(log: &Arc<SharedLog<u32>>, index: usize) -> Consumer<u32> {
        Consumer::new(index, Arc::clone(log), 0, Duration::ZERO)
    }

    fn position_of(consumer: &Consumer<u32>) -> Position {
        *consumer.lock_position()
    }

    #[test]
    fn unpositioned_until_first_append() {
        let log = Arc::new(SharedLog::new(1));
        let consumer = consumer_over(&log, 0);
        assert_eq!(consumer.size(), 0);
        assert_eq!(consumer.try_pop(), None);
        assert_eq!(position_of(&consumer), Position::Unpositioned);

        log.append(7);
        assert_eq!(consumer.size(), 1);
        assert_eq!(position_of(&consumer), Position::Positioned(0));
    }

    #[test]
    fn popping_the_tail_stagnates() {
        let log = Arc::new(SharedLog::new(1));
        let consumer = consumer_over(&log, 0);
        log.append(1);
        log.append(2);

        assert_eq!(consumer.try_pop(), Some(1));
        assert_eq!(position_of(&consumer), Position::Positioned(1));
        assert_eq!(consumer.try_pop(), Some(2));
        assert_eq!(position_of(&consumer), Position::Stagnated(1));
        assert_eq!(consumer.try_pop(), None);
        assert_eq!(position_of(&consumer), Position::Stagnated(1));

        log.append(3);
        assert_eq!(consumer.try_pop(), Some(3));
        assert_eq!(position_of(&consumer), Position::Stagnated(2));
    }

    #[test]
    fn stagnated_entry_survives_reclamation() {
        let log = Arc::new(SharedLog::new(1));
        let consumer = consumer_over(&log, 0);
        for i in 0..5 {
            log.append(i);
        }
        for i in 0..5 {
            assert_eq!(consumer.try_pop(), Some(i));
        }
        assert_eq!(position_of(&consumer), Position::Stagnated(4));

        log.append(5);
        {
            let store = log.read();
            assert_eq!(store.head(), 4);
            assert_eq!(store.get(4), Some(&4));
        }
        assert_eq!(consumer.size(), 1);
        assert_eq!(consumer.try_pop(), Some(5));
    }

    #[test]
    fn backlog_limit_drops_oldest() {
        let log = Arc::new(SharedLog::new(1));
        let consumer = consumer_over(&log, 0);
        for i in 0..10 {
            log.append(i);
        }
        consumer.set_backlog_limit(3);
        assert_eq!(consumer.backlog_limit(), 3);
        assert_eq!(consumer.size(), 3);
        assert_eq!(position_of(&consumer), Position::Positioned(7));
        assert_eq!(consumer.try_pop(), Some(7));
    }

    #[test]
    fn backlog_limit_on_stagnated_consumer() {
        let log = Arc::new(SharedLog::new(2));
        let consumer = consumer_over(&log, 0);
        log.append(0);
        assert_eq!(consumer.try_pop(), Some(0));
        assert_eq!(position_of(&consumer), Position::Stagnated(0));

        for i in 1..6 {
            log.append(i);
        }
        consumer.set_backlog_limit(2);
        assert_eq!(consumer.size(), 2);
        assert_eq!(position_of(&consumer), Position::Stagnated(3));
        assert_eq!(consumer.try_pop(), Some(4));
        assert_eq!(consumer.try_pop(), Some(5));
        assert_eq!(consumer.size(), 0);
    }
}
