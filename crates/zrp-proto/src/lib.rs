//! Zone Routing Protocol Definitions
//!
//! This crate defines the value types every device shares (identifiers and
//! public keys) and the tagged wire encoding of each datagram kind exchanged
//! by the routing engine.

pub mod codec;
pub mod datagrams;
pub mod error;
pub mod types;

pub use codec::{DatagramTag, WireCodec, WireDatagram, HEADER_LENGTH, MAX_BODY_SIZE, TAG_LENGTH};
pub use datagrams::{
    Advertisement, Datagram, DeliveryFailure, FailureReason, Message, RouteDiscovery,
    RouteDiscoveryAck, SIGNATURE_LENGTH,
};
pub use error::{ProtocolError, Result};
pub use types::{Identifier, PublicKey, PUBLIC_KEY_LENGTH};
