//! Datagram dispatcher and relay engine
//!
//! [`Network`] owns every piece of per-device routing state and is the only
//! component that touches more than one of them. It never performs I/O:
//! each operation returns (or queues) the datagrams to transmit, and the
//! surrounding device loop moves bytes between the engine and a transport.
//!
//! The engine is synchronous and single-threaded. Callers sharing one
//! instance across threads must serialize access themselves.

use crate::clock::Clock;
use crate::config::RoutingConfig;
use crate::credentials::CredentialsStore;
use crate::crypto;
use crate::identity::Identity;
use crate::message;
use crate::packet::DatagramPacket;
use crate::route_cache::RouteCache;
use crate::routing_table::{is_loop_free, RoutingTable};
use crate::{Result, RoutingError};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zrp_proto::{
    Advertisement, Datagram, DeliveryFailure, Identifier, Message, PublicKey, RouteDiscovery,
    RouteDiscoveryAck, WireCodec,
};

/// How a payload handed to [`Network::queue_message_to`] left the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Sent along an intra-zone route
    Local,

    /// Wrapped for a cached inter-zone route
    InterZone,

    /// Parked until route discovery completes
    Queued,
}

/// Result of handling an inbound message
enum MessageOutcome {
    /// Relayed towards the next hop
    Forward(DatagramPacket),

    /// Addressed to us; plaintext must be classified again
    Unwrapped(Vec<u8>),

    Dropped,
}

/// Routing and secure relay engine of one device
pub struct Network {
    config: RoutingConfig,
    identity: Identity,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,

    routing_table: RoutingTable,
    route_cache: RouteCache,
    credentials: CredentialsStore,

    /// Datagrams ready to transmit
    outgoing_queue: Vec<DatagramPacket>,

    /// Fully unwrapped application payloads
    incoming_buffer: Vec<Vec<u8>>,

    /// Payloads waiting for a discovered route, per destination
    routing_queue: HashMap<Identifier, Vec<Vec<u8>>>,

    /// Destinations with a discovery in flight, and when it was issued
    pending_discoveries: HashMap<Identifier, u64>,
}

impl Network {
    /// Create the engine for one device
    pub fn new(
        config: RoutingConfig,
        identity: Identity,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        let routing_table = RoutingTable::new(identity.id(), config.zone_radius);
        let route_cache = RouteCache::new(config.route_cache_ttl_ms);

        Self {
            config,
            identity,
            clock,
            rng,
            routing_table,
            route_cache,
            credentials: CredentialsStore::new(),
            outgoing_queue: Vec::new(),
            incoming_buffer: Vec::new(),
            routing_queue: HashMap::new(),
            pending_discoveries: HashMap::new(),
        }
    }

    /// Local device identifier
    pub fn id(&self) -> Identifier {
        self.identity.id()
    }

    /// Local device public key
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Engine configuration
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Intra-zone routing table
    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Inter-zone route cache
    pub fn route_cache(&self) -> &RouteCache {
        &self.route_cache
    }

    /// Known device keys
    pub fn credentials(&self) -> &CredentialsStore {
        &self.credentials
    }

    /// Shortest live intra-zone route to a device
    pub fn route_to(&mut self, target: &Identifier) -> Result<Vec<Identifier>> {
        let now = self.clock.now();
        self.routing_table.get_route_to(target, now)
    }

    /// Shortest live cached inter-zone route to a device
    pub fn cached_route_to(&mut self, target: &Identifier) -> Result<Vec<Identifier>> {
        let now = self.clock.now();
        self.route_cache.get_route_to(target, now)
    }

    /// Current bordercast nodes
    pub fn bordercast_nodes(&mut self) -> Vec<Identifier> {
        let now = self.clock.now();
        self.routing_table.get_bordercast_nodes(&[], now)
    }

    /// Payloads parked for a destination
    pub fn pending_for(&self, target: &Identifier) -> &[Vec<u8>] {
        self.routing_queue.get(target).map_or(&[], Vec::as_slice)
    }

    /// Drain datagrams ready to transmit
    pub fn take_outgoing(&mut self) -> Vec<DatagramPacket> {
        std::mem::take(&mut self.outgoing_queue)
    }

    /// Drain application payloads delivered to this device
    pub fn take_incoming(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.incoming_buffer)
    }

    /// Build this device's own advertisement for broadcast
    pub fn advertise(&self) -> Result<DatagramPacket> {
        let adv = Advertisement::new(
            self.id(),
            self.public_key(),
            self.config.advertisement_interval_ms,
        );
        Ok(DatagramPacket::broadcast(WireCodec::encode_as(&adv)?))
    }

    /// Classify and handle one received datagram
    ///
    /// Returns the datagrams to transmit in response, in the order they
    /// were produced. Malformed input is dropped silently. Bytes without a
    /// datagram tag are application payloads and end up in the incoming
    /// buffer.
    pub fn process_datagram(&mut self, bytes: &[u8]) -> Vec<DatagramPacket> {
        let mut out = Vec::new();
        let mut pending: Vec<(Vec<u8>, usize)> = vec![(bytes.to_vec(), 0)];

        while let Some((buf, depth)) = pending.pop() {
            if depth > self.config.max_nesting_depth {
                debug!(depth, "Dropping payload nested too deeply");
                continue;
            }

            if WireCodec::peek_tag(&buf).is_none() {
                debug!(len = buf.len(), "Delivered application payload");
                self.incoming_buffer.push(buf);
                continue;
            }

            let datagram = match WireCodec::decode(&buf) {
                Ok(datagram) => datagram,
                Err(e) => {
                    debug!("Dropping malformed datagram: {}", e);
                    continue;
                }
            };

            match datagram {
                Datagram::Advertisement(adv) => out.extend(self.handle_advertisement(adv)),
                Datagram::RouteDiscovery(discovery) => {
                    out.extend(self.handle_route_discovery(discovery))
                }
                Datagram::RouteDiscoveryAck(ack) => out.extend(self.handle_acknowledgement(ack)),
                Datagram::DeliveryFailure(failure) => self.handle_delivery_failure(failure),
                Datagram::Message(msg) => match self.handle_message(msg) {
                    MessageOutcome::Forward(packet) => out.push(packet),
                    MessageOutcome::Unwrapped(plaintext) => pending.push((plaintext, depth + 1)),
                    MessageOutcome::Dropped => {}
                },
            }
        }

        out
    }

    /// Send a payload to any device, discovering a route if needed
    ///
    /// Produced datagrams are placed on the outgoing queue. Payloads whose
    /// first bytes spell a datagram tag are refused, since the destination
    /// would classify them as datagrams.
    pub fn queue_message_to(&mut self, target: Identifier, payload: &[u8]) -> Result<SendOutcome> {
        if let Some(tag) = WireCodec::peek_tag(payload) {
            return Err(RoutingError::ReservedPayloadPrefix(tag));
        }

        let (outcome, packets) = self.route_payload(target, payload)?;
        self.outgoing_queue.extend(packets);
        Ok(outcome)
    }

    /// Send a payload along an intra-zone route
    ///
    /// Returns a single-hop packet for the first hop after this device.
    pub fn send_message_local_to(
        &mut self,
        target: Identifier,
        payload: &[u8],
    ) -> Result<DatagramPacket> {
        let now = self.clock.now();
        let route = self
            .routing_table
            .get_route_to(&target, now)
            .map_err(|_| RoutingError::TargetUnreachable(target))?;
        let key = self
            .credentials
            .get_key(&target)
            .map_err(|_| RoutingError::TargetPublicKeyUnknown(target))?;
        let next_hop = *route.get(1).ok_or(RoutingError::TargetUnreachable(target))?;

        let message = message::build(&mut *self.rng, payload, route, &key, self.identity.keys())?;
        let bytes = WireCodec::encode_as(&message)?;

        Ok(DatagramPacket::single(next_hop, bytes))
    }

    /// Start a route discovery for a device outside the zone
    ///
    /// The query is delivered to every bordercast node individually.
    pub fn discover_device(&mut self, target: Identifier) -> Result<Vec<DatagramPacket>> {
        let now = self.clock.now();
        let border = self.routing_table.get_bordercast_nodes(&[self.id()], now);

        let mut covered_nodes = vec![self.id()];
        covered_nodes.extend(border.iter().copied());

        let discovery = RouteDiscovery {
            origin: self.public_key(),
            destination: target,
            sent_timestamp: now,
            route: vec![self.id()],
            covered_nodes,
        };
        let bytes = WireCodec::encode_as(&discovery)?;

        let mut out = Vec::with_capacity(border.len());
        for node in border {
            match self.send_message_local_to(node, &bytes) {
                Ok(packet) => out.push(packet),
                Err(e) => debug!(node = %node, "Skipping bordercast node: {}", e),
            }
        }

        if out.is_empty() {
            debug!(target = %target, "No bordercast node reachable for discovery");
        } else {
            info!(target = %target, queries = out.len(), "Route discovery started");
            self.pending_discoveries.insert(target, now);
        }

        Ok(out)
    }

    /// Try local delivery, then a cached inter-zone route, then discovery
    fn route_payload(
        &mut self,
        target: Identifier,
        payload: &[u8],
    ) -> Result<(SendOutcome, Vec<DatagramPacket>)> {
        match self.send_message_local_to(target, payload) {
            Ok(packet) => return Ok((SendOutcome::Local, vec![packet])),
            Err(e) => debug!(target = %target, "No local delivery: {}", e),
        }

        match self.send_inter_zone(target, payload) {
            Ok(packet) => return Ok((SendOutcome::InterZone, vec![packet])),
            Err(e) => debug!(target = %target, "No inter-zone delivery: {}", e),
        }

        self.routing_queue
            .entry(target)
            .or_default()
            .push(payload.to_vec());

        let now = self.clock.now();
        let in_flight = self
            .pending_discoveries
            .get(&target)
            .is_some_and(|started| now.saturating_sub(*started) < self.config.discovery_timeout_ms);

        if in_flight {
            return Ok((SendOutcome::Queued, Vec::new()));
        }

        let packets = self.discover_device(target)?;
        Ok((SendOutcome::Queued, packets))
    }

    /// Wrap a payload for a cached route and hand it to the first border
    /// node along an intra-zone route
    fn send_inter_zone(&mut self, target: Identifier, payload: &[u8]) -> Result<DatagramPacket> {
        let now = self.clock.now();
        let route = self.route_cache.get_route_to(&target, now)?;
        let key = self
            .credentials
            .get_key(&target)
            .map_err(|_| RoutingError::TargetPublicKeyUnknown(target))?;
        let border = *route.get(1).ok_or(RoutingError::NoRouteAvailable(target))?;

        let inner = message::build(&mut *self.rng, payload, route, &key, self.identity.keys())?;
        let inner_bytes = WireCodec::encode_as(&inner)?;

        self.send_message_local_to(border, &inner_bytes)
    }

    fn handle_advertisement(&mut self, mut adv: Advertisement) -> Option<DatagramPacket> {
        if adv.origin == self.id() {
            return None;
        }

        if adv.route.contains(&self.id()) {
            debug!(origin = %adv.origin, "Advertisement already traversed this device");
            return None;
        }

        if adv.route.contains(&adv.origin) || !is_loop_free(&adv.route) {
            debug!(origin = %adv.origin, "Dropping looping advertisement");
            return None;
        }

        adv.route.push(self.id());

        let now = self.clock.now();
        self.routing_table.process_advertisement(&adv, now);

        if let Err(e) = self.credentials.insert_key(adv.origin, adv.public_key) {
            warn!(origin = %adv.origin, "Rejected advertised key: {}", e);
            return None;
        }

        let hops = adv.route.len();
        if hops > self.config.zone_radius {
            debug!(origin = %adv.origin, hops, "Advertisement reached zone edge");
            return None;
        }

        match WireCodec::encode_as(&adv) {
            Ok(bytes) => Some(DatagramPacket::broadcast(bytes)),
            Err(e) => {
                debug!("Failed to re-encode advertisement: {}", e);
                None
            }
        }
    }

    fn handle_route_discovery(&mut self, mut discovery: RouteDiscovery) -> Vec<DatagramPacket> {
        let now = self.clock.now();

        if !is_loop_free(&discovery.route) || discovery.route.contains(&self.id()) {
            debug!(destination = %discovery.destination, "Dropping looping discovery");
            return Vec::new();
        }

        if discovery.destination == self.id() {
            return self.answer_discovery(discovery, now).into_iter().collect();
        }

        discovery.route.push(self.id());

        if self.routing_table.get_route_to(&discovery.destination, now).is_ok() {
            let sent = WireCodec::encode_as(&discovery)
                .map_err(RoutingError::from)
                .and_then(|bytes| self.send_message_local_to(discovery.destination, &bytes));

            match sent {
                Ok(packet) => {
                    debug!(destination = %discovery.destination, "Discovery target is in zone");
                    return vec![packet];
                }
                Err(e) => debug!("Short-circuit delivery failed: {}", e),
            }
        }

        if discovery.route.len() > self.config.max_route_length {
            debug!(
                destination = %discovery.destination,
                hops = discovery.route.len(),
                "Dropping discovery over maximum route length"
            );
            return Vec::new();
        }

        let mut exclude = discovery.covered_nodes.clone();
        exclude.extend(discovery.route.iter().copied());
        let targets = self.routing_table.get_bordercast_nodes(&exclude, now);

        if targets.is_empty() {
            debug!(destination = %discovery.destination, "No uncovered bordercast nodes");
            return Vec::new();
        }

        discovery.covered_nodes.extend(targets.iter().copied());

        let bytes = match WireCodec::encode_as(&discovery) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Failed to re-encode discovery: {}", e);
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(targets.len());
        for node in targets {
            match self.send_message_local_to(node, &bytes) {
                Ok(packet) => out.push(packet),
                Err(e) => debug!(node = %node, "Skipping bordercast node: {}", e),
            }
        }

        out
    }

    /// Reply to a discovery that was looking for this device
    fn answer_discovery(&mut self, discovery: RouteDiscovery, now: u64) -> Option<DatagramPacket> {
        let requester = discovery.requester()?;

        if let Err(e) = self.credentials.insert_key(requester, discovery.origin) {
            warn!(requester = %requester, "Rejected discovery key: {}", e);
            return None;
        }

        let mut route = discovery.route;
        route.push(self.id());
        let previous = route[route.len() - 2];

        let reversed: Vec<Identifier> = route.iter().rev().copied().collect();
        self.route_cache.add_route(requester, reversed, now);

        let ack = RouteDiscoveryAck {
            route,
            target_key: self.public_key(),
        };

        info!(requester = %requester, hops = ack.route.len() - 1, "Answering route discovery");

        let bytes = WireCodec::encode_as(&ack)
            .map_err(|e| debug!("Failed to encode acknowledgement: {}", e))
            .ok()?;

        self.send_message_local_to(previous, &bytes)
            .map_err(|e| debug!(previous = %previous, "Cannot return acknowledgement: {}", e))
            .ok()
    }

    fn handle_acknowledgement(&mut self, ack: RouteDiscoveryAck) -> Vec<DatagramPacket> {
        if !is_loop_free(&ack.route) {
            debug!("Dropping looping acknowledgement");
            return Vec::new();
        }

        let Some(position) = ack.route.iter().position(|id| *id == self.id()) else {
            debug!("Acknowledgement not meant for this device");
            return Vec::new();
        };

        if position > 0 {
            let previous = ack.route[position - 1];
            return WireCodec::encode_as(&ack)
                .map_err(RoutingError::from)
                .and_then(|bytes| self.send_message_local_to(previous, &bytes))
                .map_err(|e| debug!(previous = %previous, "Cannot relay acknowledgement: {}", e))
                .ok()
                .into_iter()
                .collect();
        }

        let Some(target) = ack.target() else {
            return Vec::new();
        };

        let key = match crypto::public_key_from_compressed(&ack.target_key.to_compressed()) {
            Ok(key) => key,
            Err(e) => {
                debug!(target = %target, "Acknowledgement carries invalid key: {}", e);
                return Vec::new();
            }
        };

        if let Err(e) = self.credentials.insert_key(target, key) {
            warn!(target = %target, "Rejected discovered key: {}", e);
            return Vec::new();
        }

        let now = self.clock.now();
        let hops = ack.route.len() - 1;
        self.route_cache.add_route(target, ack.route, now);
        self.pending_discoveries.remove(&target);

        info!(target = %target, hops, "Route discovered");

        let queued = self.routing_queue.remove(&target).unwrap_or_default();
        let mut out = Vec::new();
        for payload in queued {
            match self.route_payload(target, &payload) {
                Ok((_, packets)) => out.extend(packets),
                Err(e) => debug!(target = %target, "Failed to flush queued payload: {}", e),
            }
        }

        out
    }

    fn handle_delivery_failure(&mut self, failure: DeliveryFailure) {
        warn!(
            origin = %failure.origin,
            destination = %failure.destination,
            reason = ?failure.reason,
            "Delivery failure reported"
        );
    }

    fn handle_message(&mut self, msg: Message) -> MessageOutcome {
        if !is_loop_free(&msg.route) {
            debug!("Dropping message with looping route");
            return MessageOutcome::Dropped;
        }

        if msg.recipient() == Some(self.id()) {
            return self.open_message(&msg);
        }

        let Some(index) = msg.route.iter().position(|id| *id == self.id()) else {
            debug!("Message not routed through this device");
            return MessageOutcome::Dropped;
        };

        let next_hop = msg.route[index + 1];
        let now = self.clock.now();

        let route = match self.routing_table.get_route_to(&next_hop, now) {
            Ok(route) => route,
            Err(e) => {
                debug!(next_hop = %next_hop, "Cannot relay message: {}", e);
                return MessageOutcome::Dropped;
            }
        };
        let key = match self.credentials.get_key(&next_hop) {
            Ok(key) => key,
            Err(e) => {
                debug!(next_hop = %next_hop, "Cannot relay message: {}", e);
                return MessageOutcome::Dropped;
            }
        };

        let bytes = match WireCodec::encode_as(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Failed to re-encode message: {}", e);
                return MessageOutcome::Dropped;
            }
        };

        if route.len() == 2 {
            debug!(next_hop = %next_hop, "Relaying message");
            return MessageOutcome::Forward(DatagramPacket::single(next_hop, bytes));
        }

        // Next hop is several hops away: carry the message inside a new
        // one addressed along the intra-zone route
        let first_leg = route[1];
        let outer = message::build(&mut *self.rng, &bytes, route, &key, self.identity.keys())
            .and_then(|outer| WireCodec::encode_as(&outer).map_err(RoutingError::from));

        match outer {
            Ok(outer_bytes) => {
                debug!(next_hop = %next_hop, via = %first_leg, "Re-wrapping message");
                MessageOutcome::Forward(DatagramPacket::single(first_leg, outer_bytes))
            }
            Err(e) => {
                debug!("Failed to re-wrap message: {}", e);
                MessageOutcome::Dropped
            }
        }
    }

    fn open_message(&mut self, msg: &Message) -> MessageOutcome {
        let Some(sender) = msg.sender() else {
            return MessageOutcome::Dropped;
        };

        let key = match self.credentials.get_key(&sender) {
            Ok(key) => key,
            Err(e) => {
                debug!(sender = %sender, "Cannot open message: {}", e);
                return MessageOutcome::Dropped;
            }
        };

        match message::open(msg, self.identity.keys(), &key) {
            Ok(plaintext) => MessageOutcome::Unwrapped(plaintext),
            Err(e) => {
                debug!(sender = %sender, "Dropping message: {}", e);
                MessageOutcome::Dropped
            }
        }
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("id", &self.id().to_string())
            .field("outgoing", &self.outgoing_queue.len())
            .field("incoming", &self.incoming_buffer.len())
            .field("parked_destinations", &self.routing_queue.len())
            .finish()
    }
}
