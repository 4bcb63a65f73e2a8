//! Node error types

use thiserror::Error;

/// Node-level errors
#[derive(Error, Debug)]
pub enum NodeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Routing engine or transport error
    #[error("Routing error: {0}")]
    Routing(#[from] zrp_core::RoutingError),

    /// Wire protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] zrp_proto::ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The node loop has stopped
    #[error("Node has shut down")]
    Shutdown,
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
