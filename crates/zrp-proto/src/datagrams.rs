//! Datagram definitions

use crate::codec::{DatagramTag, WireDatagram};
use crate::{Identifier, ProtocolError, PublicKey, Result};
use serde::{Deserialize, Serialize};

/// Length of an Ed25519 signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Every datagram kind the routing engine understands
///
/// Decoding produces exactly one of these; the dispatcher matches on it
/// exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// Intra-zone route advertisement
    Advertisement(Advertisement),

    /// Inter-zone route query
    RouteDiscovery(RouteDiscovery),

    /// Answer to a route query, walked back to the requester
    RouteDiscoveryAck(RouteDiscoveryAck),

    /// Notification that a relay gave up
    DeliveryFailure(DeliveryFailure),

    /// Encrypted, signed transport envelope
    Message(Message),
}

impl Datagram {
    /// Get the wire tag of this datagram
    pub fn tag(&self) -> DatagramTag {
        match self {
            Datagram::Advertisement(_) => DatagramTag::Advertisement,
            Datagram::RouteDiscovery(_) => DatagramTag::RouteDiscovery,
            Datagram::RouteDiscoveryAck(_) => DatagramTag::RouteDiscoveryAck,
            Datagram::DeliveryFailure(_) => DatagramTag::DeliveryFailure,
            Datagram::Message(_) => DatagramTag::Message,
        }
    }
}

/// Proactive announcement of a device to its zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Advertising device
    pub origin: Identifier,

    /// Advertising device's public key
    pub public_key: PublicKey,

    /// Relays traversed so far, nearest to the origin first
    pub route: Vec<Identifier>,

    /// Validity of the advertised routes in milliseconds
    pub interval: u64,
}

impl Advertisement {
    /// Default validity of an advertisement (10 seconds)
    pub const DEFAULT_INTERVAL_MS: u64 = 10_000;

    /// Create an advertisement with an empty relay path
    pub fn new(origin: Identifier, public_key: PublicKey, interval: u64) -> Self {
        Self {
            origin,
            public_key,
            route: Vec::new(),
            interval,
        }
    }
}

/// Reactive query for a device outside the local zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDiscovery {
    /// Public key of the requesting device
    pub origin: PublicKey,

    /// Device being searched for
    pub destination: Identifier,

    /// Requester's clock when the query was issued
    pub sent_timestamp: u64,

    /// Accumulated path, requester first
    pub route: Vec<Identifier>,

    /// Devices already targeted by this flood
    pub covered_nodes: Vec<Identifier>,
}

impl RouteDiscovery {
    /// Identifier of the requesting device
    pub fn requester(&self) -> Option<Identifier> {
        self.route.first().copied()
    }
}

/// Answer to a [`RouteDiscovery`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDiscoveryAck {
    /// Full discovered path, requester first and discovered device last
    pub route: Vec<Identifier>,

    /// Public key of the discovered device
    pub target_key: PublicKey,
}

impl RouteDiscoveryAck {
    /// Identifier of the discovered device
    pub fn target(&self) -> Option<Identifier> {
        self.route.last().copied()
    }
}

/// Why a relay abandoned a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Discovery exceeded the maximum route length
    RouteTooLong,

    /// Relay had no route or key for the next hop
    NextHopUnknown,
}

/// Delivery failure notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// Device that originated the failed datagram
    pub origin: Identifier,

    /// Intended destination
    pub destination: Identifier,

    /// Failure reason
    pub reason: FailureReason,
}

/// Transport envelope
///
/// The payload is ciphertext for the final hop of `route`; the signature
/// covers the plaintext and was made by the first hop. A message may itself
/// be the plaintext of an outer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Ordered hop list, sender first and recipient last
    pub route: Vec<Identifier>,

    /// Encrypted payload
    pub payload: Vec<u8>,

    /// Sender's signature over the plaintext
    pub signature: Vec<u8>,
}

impl Message {
    /// First hop of the route
    pub fn sender(&self) -> Option<Identifier> {
        self.route.first().copied()
    }

    /// Last hop of the route
    pub fn recipient(&self) -> Option<Identifier> {
        self.route.last().copied()
    }
}

fn check_identifiers<'a>(ids: impl IntoIterator<Item = &'a Identifier>) -> Result<()> {
    if ids.into_iter().any(Identifier::is_nil) {
        return Err(ProtocolError::InvalidIdentifier);
    }
    Ok(())
}

impl WireDatagram for Advertisement {
    const TAG: DatagramTag = DatagramTag::Advertisement;

    fn verify(&self) -> Result<()> {
        check_identifiers(std::iter::once(&self.origin).chain(&self.route))
    }

    fn into_datagram(self) -> Datagram {
        Datagram::Advertisement(self)
    }
}

impl WireDatagram for RouteDiscovery {
    const TAG: DatagramTag = DatagramTag::RouteDiscovery;

    fn verify(&self) -> Result<()> {
        if self.route.is_empty() {
            return Err(ProtocolError::InvalidBuffer(
                "Discovery route is empty".to_string(),
            ));
        }
        check_identifiers(
            std::iter::once(&self.destination)
                .chain(&self.route)
                .chain(&self.covered_nodes),
        )
    }

    fn into_datagram(self) -> Datagram {
        Datagram::RouteDiscovery(self)
    }
}

impl WireDatagram for RouteDiscoveryAck {
    const TAG: DatagramTag = DatagramTag::RouteDiscoveryAck;

    fn verify(&self) -> Result<()> {
        if self.route.len() < 2 {
            return Err(ProtocolError::InvalidBuffer(
                "Acknowledgement route needs at least two hops".to_string(),
            ));
        }
        check_identifiers(&self.route)
    }

    fn into_datagram(self) -> Datagram {
        Datagram::RouteDiscoveryAck(self)
    }
}

impl WireDatagram for DeliveryFailure {
    const TAG: DatagramTag = DatagramTag::DeliveryFailure;

    fn verify(&self) -> Result<()> {
        check_identifiers([&self.origin, &self.destination])
    }

    fn into_datagram(self) -> Datagram {
        Datagram::DeliveryFailure(self)
    }
}

impl WireDatagram for Message {
    const TAG: DatagramTag = DatagramTag::Message;

    fn verify(&self) -> Result<()> {
        if self.route.is_empty() {
            return Err(ProtocolError::InvalidBuffer(
                "Message route is empty".to_string(),
            ));
        }
        if self.signature.len() != SIGNATURE_LENGTH {
            return Err(ProtocolError::InvalidBuffer(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_LENGTH,
                self.signature.len()
            )));
        }
        check_identifiers(&self.route)
    }

    fn into_datagram(self) -> Datagram {
        Datagram::Message(self)
    }
}
