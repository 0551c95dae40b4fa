//! Error types for control operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    ProtocolDeserialization(#[from] bincode::error::DecodeError),

    #[error("protocol error: {0}")]
    ProtocolSerialization(#[from] bincode::error::EncodeError),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("invalid socket path: {0}")]
    InvalidSocketPath(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
