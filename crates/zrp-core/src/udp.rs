//! UDP transport
//!
//! Each neighbour is a UDP socket address. Broadcasts are sent to every
//! configured neighbour individually, so the peer list doubles as the
//! device's radio range.

use crate::interface::Transport;
use crate::packet::{DatagramPacket, MessageTarget};
use crate::{Result, RoutingError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zrp_proto::{Identifier, HEADER_LENGTH, MAX_BODY_SIZE};

const RECEIVE_BUFFER_SIZE: usize = HEADER_LENGTH + MAX_BODY_SIZE;

/// Transport over a single bound UDP socket
pub struct UdpTransport {
    name: String,
    socket: UdpSocket,
    peers: Mutex<HashMap<Identifier, SocketAddr>>,
}

impl UdpTransport {
    /// Bind to `listen` with an initial set of neighbours
    pub async fn bind(
        listen: SocketAddr,
        peers: impl IntoIterator<Item = (Identifier, SocketAddr)>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(listen).await?;
        let local = socket.local_addr()?;
        info!("UDP transport listening on {}", local);

        Ok(Self {
            name: format!("udp-{}", local),
            socket,
            peers: Mutex::new(peers.into_iter().collect()),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Register or replace a neighbour's address
    pub async fn add_peer(&self, id: Identifier, addr: SocketAddr) {
        self.peers.lock().await.insert(id, addr);
    }

    /// Forget a neighbour
    pub async fn remove_peer(&self, id: &Identifier) -> Option<SocketAddr> {
        self.peers.lock().await.remove(id)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, packet: &DatagramPacket) -> Result<()> {
        let targets: Vec<SocketAddr> = {
            let peers = self.peers.lock().await;
            match packet.target {
                MessageTarget::Single(id) => {
                    let addr = peers.get(&id).ok_or_else(|| {
                        RoutingError::Connection(format!("Unknown neighbour {}", id))
                    })?;
                    vec![*addr]
                }
                MessageTarget::Broadcast => peers.values().copied().collect(),
            }
        };

        for addr in targets {
            debug!(len = packet.payload.len(), "Sending datagram to {}", addr);
            self.socket.send_to(&packet.payload, addr).await?;
        }

        Ok(())
    }

    async fn receive(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        debug!(len, "Received datagram from {}", from);

        buf.truncate(len);
        Ok(Bytes::from(buf))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn is_ready(&self) -> bool {
        self.socket.local_addr().is_ok()
    }

    async fn close(&self) -> Result<()> {
        info!("Closing {}", self.name);
        self.peers.lock().await.clear();
        Ok(())
    }
}
