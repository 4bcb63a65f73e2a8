//! Device event loop
//!
//! A [`Node`] owns the routing engine and a transport. It advertises on a
//! fixed period, feeds every received datagram to the engine, transmits
//! whatever the engine produces, and hands delivered payloads to the
//! [`Inbox`]. Applications talk to it through a cloneable [`NodeHandle`].

use crate::config::NodeConfig;
use crate::{NodeError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use zrp_core::{Clock, DatagramPacket, Network, RoutingError, SendOutcome, Transport};
use zrp_proto::Identifier;

const REQUEST_QUEUE_DEPTH: usize = 64;

/// Request from a [`NodeHandle`] to the event loop
enum NodeRequest {
    Send {
        target: Identifier,
        payload: Vec<u8>,
        reply: oneshot::Sender<zrp_core::Result<SendOutcome>>,
    },
}

/// Cloneable handle for sending payloads through a running node
#[derive(Clone)]
pub struct NodeHandle {
    id: Identifier,
    requests: mpsc::Sender<NodeRequest>,
}

impl NodeHandle {
    /// Identifier of the node
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Send a payload to any device
    pub async fn send(&self, target: Identifier, payload: Vec<u8>) -> Result<SendOutcome> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(NodeRequest::Send {
                target,
                payload,
                reply,
            })
            .await
            .map_err(|_| NodeError::Shutdown)?;

        Ok(response.await.map_err(|_| NodeError::Shutdown)??)
    }
}

/// Payloads delivered to the node
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Inbox {
    /// Wait for the next delivered payload
    ///
    /// Returns `None` once the node has stopped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// A routing device bound to a transport
pub struct Node {
    network: Network,
    transport: Arc<dyn Transport>,
    requests: mpsc::Receiver<NodeRequest>,
    inbox: mpsc::UnboundedSender<Vec<u8>>,
    advertise_every: Duration,
}

impl Node {
    /// Create a node
    ///
    /// The node stops once every [`NodeHandle`] has been dropped.
    pub fn new(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> (Self, NodeHandle, Inbox) {
        let id = config.identity.id();
        let network = Network::new(
            config.routing,
            config.identity,
            clock,
            Box::new(StdRng::from_entropy()),
        );

        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let node = Self {
            network,
            transport,
            requests: request_rx,
            inbox: inbox_tx,
            advertise_every: Duration::from_millis(config.advertise_every_ms),
        };
        let handle = NodeHandle {
            id,
            requests: request_tx,
        };

        (node, handle, Inbox { rx: inbox_rx })
    }

    /// Identifier of the node
    pub fn id(&self) -> Identifier {
        self.network.id()
    }

    /// Run the event loop until all handles are dropped or the transport
    /// closes
    pub async fn run(mut self) -> Result<()> {
        info!("Node {} starting on {}", self.id(), self.transport.name());

        if !self.transport.is_ready().await {
            return Err(NodeError::Routing(RoutingError::Connection(format!(
                "Transport {} not ready",
                self.transport.name()
            ))));
        }

        let mut ticker = interval(self.advertise_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let transport = Arc::clone(&self.transport);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let advert = self.network.advertise()?;
                    transmit(&*self.transport, vec![advert]).await;
                }

                received = transport.receive() => {
                    let bytes = match received {
                        Ok(bytes) => bytes,
                        Err(RoutingError::Connection(reason)) => {
                            error!("Transport closed: {}", reason);
                            return Err(NodeError::Routing(RoutingError::Connection(reason)));
                        }
                        Err(e) => {
                            warn!("Error receiving datagram: {}", e);
                            continue;
                        }
                    };

                    let replies = self.network.process_datagram(&bytes);
                    transmit(&*self.transport, replies).await;
                    self.flush_outgoing().await;
                    self.deliver_incoming();
                }

                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request).await,
                        None => break,
                    }
                }
            }
        }

        info!("Node {} shutting down", self.id());
        self.transport.close().await?;

        Ok(())
    }

    async fn handle_request(&mut self, request: NodeRequest) {
        match request {
            NodeRequest::Send {
                target,
                payload,
                reply,
            } => {
                let outcome = self.network.queue_message_to(target, &payload);
                if let Ok(outcome) = &outcome {
                    debug!(target = %target, ?outcome, "Payload accepted");
                }
                let _ = reply.send(outcome);
                self.flush_outgoing().await;
            }
        }
    }

    async fn flush_outgoing(&mut self) {
        let outgoing = self.network.take_outgoing();
        transmit(&*self.transport, outgoing).await;
    }

    fn deliver_incoming(&mut self) {
        for payload in self.network.take_incoming() {
            if self.inbox.send(payload).is_err() {
                debug!("Inbox dropped, discarding delivered payload");
            }
        }
    }
}

async fn transmit(transport: &dyn Transport, packets: Vec<DatagramPacket>) {
    for packet in packets {
        if let Err(e) = transport.send(&packet).await {
            warn!(to = ?packet.target, "Failed to transmit datagram: {}", e);
        }
    }
}
