//! Routing engine error types

use thiserror::Error;
use zrp_proto::{DatagramTag, Identifier, ProtocolError};

/// Routing and relay errors
#[derive(Error, Debug)]
pub enum RoutingError {
    /// No live route to the destination
    #[error("No route available to {0}")]
    NoRouteAvailable(Identifier),

    /// No public key recorded for the device
    #[error("No public key known for {0}")]
    KeyNotFound(Identifier),

    /// A different key is already recorded for the device
    #[error("Mismatching public key already recorded for {0}")]
    MismatchingKeyExists(Identifier),

    /// Target has no intra-zone route
    #[error("Target unreachable: {0}")]
    TargetUnreachable(Identifier),

    /// Target's public key is unknown
    #[error("Target public key unknown: {0}")]
    TargetPublicKeyUnknown(Identifier),

    /// Application payload would be read back as a datagram
    #[error("Payload starts with the {0:?} datagram tag")]
    ReservedPayloadPrefix(DatagramTag),

    /// Identity error
    #[error("Identity error: {0}")]
    Identity(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Wire protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;
