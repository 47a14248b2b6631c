use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Frame too large: {len} bytes (max {max} bytes)")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Channel closed by peer")]
    ConnectionClosed,

    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl From<std::net::AddrParseError> for RpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        RpcError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
