#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Consumer index {index} is out of range (consumers: {count})")]
    OutOfRange { index: usize, count: usize },
}

pub type QueueResult<T> = Result<T, QueueError>;
