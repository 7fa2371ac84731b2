
use crate::{Queue, QueueConfig};

/// A queue whose blocking pops yield instead of sleeping.
fn spinning_queue<T>(consumers: usize) -> Queue<T> {
    let cfg = QueueConfig {
        consumers,
        poll_interval_nanos: 0,
        ..Default::default()
    };
    Queue::with_config(&cfg).expect("valid config")
}
