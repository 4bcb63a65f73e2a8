//! Protocol error types

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An identifier field failed validation
    #[error("Invalid identifier")]
    InvalidIdentifier,

    /// Buffer failed structural verification
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Leading bytes do not carry a known datagram tag
    #[error("Unknown datagram tag: {0:02x?}")]
    UnknownTag([u8; 4]),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Datagram body too large
    #[error("Datagram too large: {size} bytes (max: {max})")]
    DatagramTooLarge { size: usize, max: usize },
}

impl From<bincode::Error> for ProtocolError {
    fn from(err: bincode::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
