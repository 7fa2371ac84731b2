use std::cmp;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::trace;
use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_NANOS: u64 = 1_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub consumers: usize,
    /// Initial backlog limit per consumer index. Missing entries are unbounded.
    pub backlog_limits: Vec<usize>,
    /// Sleep between polls of a blocking pop. Zero yields instead.
    pub poll_interval_nanos: u64,
}

impl Default for QueueConfig {
    fn default() -> QueueConfig {
        QueueConfig {
            consumers: 1,
            backlog_limits: Vec::new(),
            poll_interval_nanos: DEFAULT_POLL_INTERVAL_NANOS,
        }
    }
}

impl QueueConfig {
    pub fn with_consumers(consumers: usize) -> QueueConfig {
        QueueConfig {
            consumers,
            ..Default::default()
        }
    }

    #[inline]
    pub fn backlog_limit(&self, index: usize) -> usize {
        self.backlog_limits.get(index).copied().unwrap_or(0)
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_nanos(self.poll_interval_nanos)
    }
}

/// Entries of the log, addressed by logical index.
///
/// `head` is the logical index of `entries[0]`; it only grows, by the
/// number of entries each reclamation removes.
#[derive(Debug)]
pub(crate) struct Store<T> {
    entries: VecDeque<T>,
    head: usize,
}

impl<T> Store<T> {
    fn new() -> Store<T> {
        Store {
            entries: VecDeque::new(),
            head: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub(crate) fn head(&self) -> usize {
        self.head
    }

    /// Logical index one past the last entry.
    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.head + self.entries.len()
    }

    #[inline]
    pub(crate) fn get(&self, logical_index: usize) -> Option<&T> {
        logical_index
            .checked_sub(self.head)
            .and_then(|offset| self.entries.get(offset))
    }
}

/// The backing log shared by the producer and all consumers.
///
/// Cursors are relative to the head of the store: a consumer's backlog is
/// always `store.len() - cursor`. A consumer only moves its own cursor while
/// holding the read lock, and reclamation only shifts cursors while holding
/// the write lock, so the two never interleave.
#[derive(Debug)]
pub(crate) struct SharedLog<T> {
    store: RwLock<Store<T>>,
    cursors: Box<[AtomicUsize]>,
}

impl<T> SharedLog<T> {
    pub(crate) fn new(consumers: usize) -> SharedLog<T> {
        SharedLog {
            store: RwLock::new(Store::new()),
            cursors: (0..consumers).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    // Poisoning is ignored: every lookup goes through `Store::get`, which
    // never indexes past the retained entries.
    #[inline]
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Store<T>> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, Store<T>> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn cursor(&self, consumer: usize) -> &AtomicUsize {
        &self.cursors[consumer]
    }

    pub(crate) fn retained(&self) -> usize {
        self.read().len()
    }

    pub(crate) fn append(&self, value: T) {
        let mut store = self.write();
        store.entries.push_back(value);
        self.reclaim(&mut store);
    }

    pub(crate) fn append_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        // Run the caller's iterator before locking; it may read this log.
        let values: Vec<T> = values.into_iter().collect();
        let mut store = self.write();
        for value in values {
            store.entries.push_back(value);
            self.reclaim(&mut store);
        }
    }

    /// Frees head entries no consumer can reach any more.
    ///
    /// One entry below the minimum cursor is retained: a consumer that popped
    /// the tail stays pinned on it until the next append, and its cursor
    /// already counts it as consumed.
    fn reclaim(&self, store: &mut Store<T>) -> usize {
        let min_cursor = self
            .cursors
            .iter()
            .map(|cursor| cursor.load(Ordering::Acquire))
            .fold(store.len(), cmp::min);
        if min_cursor <= 1 {
            return 0;
        }
        let reclaimed = min_cursor - 1;

        store.entries.drain(..reclaimed);
        store.head += reclaimed;
        for cursor in self.cursors.iter() {
            cursor.fetch_sub(reclaimed, Ordering::AcqRel);
        }
        trace!(
            "reclaimed {} entries, head is now at {}",
            reclaimed,
            store.head
        );
        reclaimed
    }
}
