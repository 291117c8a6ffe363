use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel '{0}' is closed")]
    Closed(String),

    #[error("Channel error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Sink is closed")]
    Closed,

    #[error("Sink error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Requested {requested} permits but the limiter allows at most {capacity} at once")]
    InsufficientCapacity { requested: u32, capacity: u32 },

    #[error("Rate limiter error: {0}")]
    Other(String),
}
