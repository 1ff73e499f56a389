use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Bridge closed: the consuming side is gone")]
    Closed,

    #[error("Bridge full: {0} messages pending")]
    Full(usize),

    #[error("Bridge already has a subscriber")]
    AlreadySubscribed,

    #[error("Invalid bridge capacity: {0}")]
    InvalidCapacity(usize),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
