//! Transport abstraction
//!
//! A transport moves encoded datagrams between neighbouring devices. It
//! knows nothing about routes: it only maps a [`MessageTarget`] to the
//! neighbours it can physically reach.

use crate::packet::{DatagramPacket, MessageTarget};
use crate::{Result, RoutingError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::debug;
use zrp_proto::Identifier;

/// Link-layer transport trait
///
/// Implementations provide datagram delivery over different media (UDP,
/// in-memory radio simulation, etc.)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmit a packet to its target neighbour(s)
    async fn send(&self, packet: &DatagramPacket) -> Result<()>;

    /// Wait for the next datagram heard by this device
    async fn receive(&self) -> Result<Bytes>;

    /// Get the transport name
    fn name(&self) -> &str;

    /// Check if the transport can carry traffic
    async fn is_ready(&self) -> bool;

    /// Close the transport
    async fn close(&self) -> Result<()>;
}

#[derive(Default)]
struct MediumState {
    inboxes: HashMap<Identifier, UnboundedSender<Bytes>>,
    links: HashSet<(Identifier, Identifier)>,
}

impl MediumState {
    fn linked(&self, from: Identifier, to: Identifier) -> bool {
        self.links.contains(&(from, to))
    }

    fn neighbours_of(&self, id: Identifier) -> Vec<Identifier> {
        self.links
            .iter()
            .filter(|(from, _)| *from == id)
            .map(|(_, to)| *to)
            .collect()
    }

    fn deliver(&self, to: Identifier, payload: &Bytes) {
        match self.inboxes.get(&to) {
            Some(inbox) if inbox.send(payload.clone()).is_ok() => {}
            _ => debug!(neighbour = %to, "Neighbour not listening, datagram lost"),
        }
    }
}

/// Simulated shared radio medium
///
/// Devices attach to the medium and hear only the devices they are linked
/// with. Datagrams addressed to an unlinked device are lost silently, like
/// an out-of-range transmission.
#[derive(Clone, Default)]
pub struct MockMedium {
    state: Arc<StdMutex<MediumState>>,
}

impl MockMedium {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MediumState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a device, returning its transport
    pub fn attach(&self, id: Identifier) -> MockTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().inboxes.insert(id, tx);

        MockTransport {
            id,
            name: format!("mock-{}", id),
            medium: self.clone(),
            rx: Mutex::new(rx),
        }
    }

    /// Put two devices in range of each other
    pub fn link(&self, a: Identifier, b: Identifier) {
        let mut state = self.state();
        state.links.insert((a, b));
        state.links.insert((b, a));
    }

    /// Take two devices out of range of each other
    pub fn unlink(&self, a: Identifier, b: Identifier) {
        let mut state = self.state();
        state.links.remove(&(a, b));
        state.links.remove(&(b, a));
    }

    /// Devices in range of `id`
    pub fn neighbours_of(&self, id: Identifier) -> Vec<Identifier> {
        self.state().neighbours_of(id)
    }
}

/// One device's view of a [`MockMedium`]
pub struct MockTransport {
    id: Identifier,
    name: String,
    medium: MockMedium,
    rx: Mutex<UnboundedReceiver<Bytes>>,
}

impl MockTransport {
    /// Identifier this transport was attached under
    pub fn id(&self) -> Identifier {
        self.id
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, packet: &DatagramPacket) -> Result<()> {
        let state = self.medium.state();

        match packet.target {
            MessageTarget::Single(to) => {
                if state.linked(self.id, to) {
                    state.deliver(to, &packet.payload);
                } else {
                    debug!(from = %self.id, to = %to, "Out of range, datagram lost");
                }
            }
            MessageTarget::Broadcast => {
                for to in state.neighbours_of(self.id) {
                    state.deliver(to, &packet.payload);
                }
            }
        }

        Ok(())
    }

    async fn receive(&self) -> Result<Bytes> {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| RoutingError::Connection("Medium closed".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn is_ready(&self) -> bool {
        self.medium.state().inboxes.contains_key(&self.id)
    }

    async fn close(&self) -> Result<()> {
        self.medium.state().inboxes.remove(&self.id);
        Ok(())
    }
}
