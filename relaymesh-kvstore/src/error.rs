use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key {0:?} holds a value of the wrong type for this operation")]
    WrongType(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KvError>;
