//! ZRP Core - Zone routing engine for ad-hoc mesh networks
//!
//! This crate provides the routing side of the protocol: device identities,
//! the intra-zone routing table built from advertisements, the inter-zone
//! route cache filled by bordercast discovery, end-to-end message sealing,
//! and the transports that carry datagrams between neighbours.

pub mod clock;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod interface;
pub mod message;
pub mod network;
pub mod packet;
pub mod route_cache;
pub mod routing_table;
pub mod udp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RoutingConfig;
pub use error::{Result, RoutingError};
pub use identity::{Identity, KeyPair};
pub use interface::{MockMedium, MockTransport, Transport};
pub use network::{Network, SendOutcome};
pub use packet::{DatagramPacket, MessageTarget};
pub use udp::UdpTransport;

/// Re-exports
pub use zrp_proto;
