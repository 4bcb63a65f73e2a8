//! Outgoing datagram packets

use bytes::Bytes;
use zrp_proto::Identifier;

/// Where a datagram should be transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    /// A single neighbour
    Single(Identifier),

    /// Every neighbour in radio range
    Broadcast,
}

/// A datagram ready for the transport
///
/// Carries no routing intelligence; the transport maps the target to a
/// physical address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramPacket {
    /// Transmission target
    pub target: MessageTarget,

    /// Encoded datagram
    pub payload: Bytes,
}

impl DatagramPacket {
    /// Create a new packet
    pub fn new(target: MessageTarget, payload: Vec<u8>) -> Self {
        Self {
            target,
            payload: Bytes::from(payload),
        }
    }

    /// Create a packet for one neighbour
    pub fn single(neighbour: Identifier, payload: Vec<u8>) -> Self {
        Self::new(MessageTarget::Single(neighbour), payload)
    }

    /// Create a broadcast packet
    pub fn broadcast(payload: Vec<u8>) -> Self {
        Self::new(MessageTarget::Broadcast, payload)
    }

    /// Neighbour this packet is addressed to, if any
    pub fn neighbour(&self) -> Option<Identifier> {
        match self.target {
            MessageTarget::Single(id) => Some(id),
            MessageTarget::Broadcast => None,
        }
    }
}
