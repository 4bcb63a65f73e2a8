//! Multi-device simulations of zone routing over synchronous radio links

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use zrp_core::routing_table::is_loop_free;
use zrp_core::zrp_proto::{Identifier, RouteDiscovery, WireCodec};
use zrp_core::{
    DatagramPacket, Identity, ManualClock, MessageTarget, Network, RoutingConfig, SendOutcome,
};

/// A set of devices and who can hear whom
struct Mesh {
    clock: ManualClock,
    nodes: Vec<Network>,
    index: HashMap<Identifier, usize>,
    links: HashSet<(usize, usize)>,
}

impl Mesh {
    fn new(count: usize, config: RoutingConfig) -> Self {
        let clock = ManualClock::default();
        let mut nodes = Vec::with_capacity(count);
        let mut index = HashMap::new();

        for i in 0..count {
            let mut rng = StdRng::seed_from_u64(1000 + i as u64);
            let identity = Identity::generate(&mut rng);
            index.insert(identity.id(), i);
            nodes.push(Network::new(
                config.clone(),
                identity,
                Arc::new(clock.clone()),
                Box::new(rng),
            ));
        }

        Self {
            clock,
            nodes,
            index,
            links: HashSet::new(),
        }
    }

    /// Devices `0 - 1 - ... - count-1` in a line
    fn chain(count: usize) -> Self {
        let mut mesh = Self::new(count, RoutingConfig::default());
        for i in 1..count {
            mesh.link(i - 1, i);
        }
        mesh
    }

    fn link(&mut self, a: usize, b: usize) {
        self.links.insert((a, b));
        self.links.insert((b, a));
    }

    fn id(&self, i: usize) -> Identifier {
        self.nodes[i].id()
    }

    fn receivers(&self, from: usize, packet: &DatagramPacket) -> Vec<usize> {
        match packet.target {
            MessageTarget::Single(id) => self
                .index
                .get(&id)
                .filter(|to| self.links.contains(&(from, **to)))
                .map(|to| vec![*to])
                .unwrap_or_default(),
            MessageTarget::Broadcast => (0..self.nodes.len())
                .filter(|to| self.links.contains(&(from, *to)))
                .collect(),
        }
    }

    /// Deliver packets until the mesh is quiet
    fn pump(&mut self, initial: Vec<(usize, DatagramPacket)>) {
        let mut queue: VecDeque<(usize, DatagramPacket)> = initial.into();
        let mut steps = 0;

        while let Some((from, packet)) = queue.pop_front() {
            steps += 1;
            assert!(steps < 10_000, "mesh did not settle");

            for to in self.receivers(from, &packet) {
                let replies = self.nodes[to].process_datagram(&packet.payload);
                queue.extend(replies.into_iter().map(|p| (to, p)));
                queue.extend(self.nodes[to].take_outgoing().into_iter().map(|p| (to, p)));
            }
        }
    }

    fn advertise_all(&mut self) {
        let adverts = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i, node.advertise().unwrap()))
            .collect();
        self.pump(adverts);
    }

    fn flush(&mut self, from: usize) {
        let out = self.nodes[from]
            .take_outgoing()
            .into_iter()
            .map(|p| (from, p))
            .collect();
        self.pump(out);
    }

    fn hops(&mut self, from: usize, to: usize) -> Option<usize> {
        let target = self.id(to);
        self.nodes[from].route_to(&target).ok().map(|r| r.len() - 1)
    }

    fn assert_loop_free(&self) {
        for node in &self.nodes {
            for route in node.routing_table().routes() {
                assert!(is_loop_free(route), "looping route in table");
            }
            for route in node.route_cache().routes() {
                assert!(is_loop_free(route), "looping route in cache");
            }
        }
    }
}

#[test]
fn test_single_advertisement_reach() {
    // A - w - x - B - y, only A advertises
    let mut mesh = Mesh::chain(5);
    let advert = mesh.nodes[0].advertise().unwrap();
    mesh.pump(vec![(0, advert)]);

    let a = mesh.id(0);
    let ids: Vec<Identifier> = (0..5).map(|i| mesh.id(i)).collect();

    assert_eq!(mesh.nodes[1].route_to(&a).unwrap(), vec![ids[1], a]);
    assert_eq!(mesh.nodes[2].route_to(&a).unwrap(), vec![ids[2], ids[1], a]);
    assert_eq!(
        mesh.nodes[3].route_to(&a).unwrap(),
        vec![ids[3], ids[2], ids[1], a]
    );
    assert!(mesh.nodes[4].route_to(&a).is_err());

    // Nobody learns a route back to themselves from echoes
    assert!(mesh.nodes[0].route_to(&a).is_err());
    assert_eq!(mesh.nodes[1].routing_table().route_count(&a), 1);
}

#[test]
fn test_linear_zone() {
    // A - w - x - B - y
    let mut mesh = Mesh::chain(5);
    mesh.advertise_all();

    assert_eq!(mesh.hops(0, 1), Some(1));
    assert_eq!(mesh.hops(0, 2), Some(2));
    assert_eq!(mesh.hops(0, 3), Some(3));
    assert_eq!(mesh.hops(0, 4), None);

    let target = mesh.id(3);
    let a_route = mesh.nodes[0].route_to(&target).unwrap();
    assert_eq!(a_route, vec![mesh.id(0), mesh.id(1), mesh.id(2), mesh.id(3)]);

    let border_hops = mesh.nodes[0].config().bordercast_hops();
    assert_eq!(border_hops, 3);
    assert_eq!(mesh.nodes[0].bordercast_nodes(), vec![mesh.id(3)]);

    // y sits in the middle of B's zone
    assert_eq!(mesh.hops(3, 4), Some(1));
    assert_eq!(mesh.hops(3, 0), Some(3));

    mesh.assert_loop_free();
}

#[test]
fn test_keys_learned_from_advertisements() {
    let mut mesh = Mesh::chain(5);
    mesh.advertise_all();

    let key = mesh.nodes[3].public_key();
    assert_eq!(mesh.nodes[0].credentials().get_key(&mesh.id(3)).unwrap(), key);
    assert!(!mesh.nodes[0].credentials().contains(&mesh.id(4)));
}

#[test]
fn test_intra_zone_delivery() {
    let mut mesh = Mesh::chain(5);
    mesh.advertise_all();

    let target = mesh.id(3);
    let outcome = mesh.nodes[0].queue_message_to(target, b"in zone").unwrap();
    assert_eq!(outcome, SendOutcome::Local);

    mesh.flush(0);

    assert_eq!(mesh.nodes[3].take_incoming(), vec![b"in zone".to_vec()]);
    assert!(mesh.nodes[1].take_incoming().is_empty());
    assert!(mesh.nodes[2].take_incoming().is_empty());
}

#[test]
fn test_discovery_queues_payload() {
    // A0 w1 x2 B3 y4 z5 C6
    let mut mesh = Mesh::chain(7);
    mesh.advertise_all();

    assert_eq!(mesh.nodes[6].bordercast_nodes(), vec![mesh.id(3)]);

    let target = mesh.id(0);
    let outcome = mesh.nodes[6].queue_message_to(target, &[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(outcome, SendOutcome::Queued);
    assert_eq!(mesh.nodes[6].pending_for(&target), &[vec![1, 2, 3, 4, 5]]);

    // One query, addressed along the intra-zone route towards B
    let outgoing = mesh.nodes[6].take_outgoing();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].target, MessageTarget::Single(mesh.id(5)));
}

#[test]
fn test_inter_zone_delivery() {
    let mut mesh = Mesh::chain(7);
    mesh.advertise_all();

    let a = mesh.id(0);
    let b = mesh.id(3);
    let c = mesh.id(6);

    mesh.nodes[6].queue_message_to(a, &[1, 2, 3, 4, 5]).unwrap();
    mesh.flush(6);

    // Discovery results are cached at both ends
    assert_eq!(mesh.nodes[6].cached_route_to(&a).unwrap(), vec![c, b, a]);
    assert_eq!(mesh.nodes[0].cached_route_to(&c).unwrap(), vec![a, b, c]);
    assert_eq!(
        mesh.nodes[0].credentials().get_key(&c).unwrap(),
        mesh.nodes[6].public_key()
    );

    assert!(mesh.nodes[6].pending_for(&a).is_empty());
    assert_eq!(mesh.nodes[0].take_incoming(), vec![vec![1, 2, 3, 4, 5]]);

    for relay in 1..6 {
        assert!(mesh.nodes[relay].take_incoming().is_empty());
    }

    mesh.assert_loop_free();
}

#[test]
fn test_cached_route_used_directly() {
    let mut mesh = Mesh::chain(7);
    mesh.advertise_all();

    let a = mesh.id(0);
    mesh.nodes[6].queue_message_to(a, b"first").unwrap();
    mesh.flush(6);
    assert_eq!(mesh.nodes[0].take_incoming(), vec![b"first".to_vec()]);

    let outcome = mesh.nodes[6].queue_message_to(a, b"second").unwrap();
    assert_eq!(outcome, SendOutcome::InterZone);
    mesh.flush(6);
    assert_eq!(mesh.nodes[0].take_incoming(), vec![b"second".to_vec()]);

    // The reply travels over the route A cached while answering
    let c = mesh.id(6);
    let outcome = mesh.nodes[0].queue_message_to(c, b"reply").unwrap();
    assert_eq!(outcome, SendOutcome::InterZone);
    mesh.flush(0);
    assert_eq!(mesh.nodes[6].take_incoming(), vec![b"reply".to_vec()]);
}

#[test]
fn test_discovery_not_repeated_while_pending() {
    let mut mesh = Mesh::chain(7);
    mesh.advertise_all();

    // Outsider nobody has heard of
    let mut rng = StdRng::seed_from_u64(7);
    let ghost = Identifier::random(&mut rng);

    mesh.nodes[6].queue_message_to(ghost, b"one").unwrap();
    assert_eq!(mesh.nodes[6].take_outgoing().len(), 1);

    mesh.nodes[6].queue_message_to(ghost, b"two").unwrap();
    assert!(mesh.nodes[6].take_outgoing().is_empty());
    assert_eq!(mesh.nodes[6].pending_for(&ghost).len(), 2);

    let timeout = mesh.nodes[6].config().discovery_timeout_ms;
    mesh.clock.advance(timeout);

    // Routes are still valid, so the query goes out again
    mesh.nodes[6].queue_message_to(ghost, b"three").unwrap();
    let outgoing = mesh.nodes[6].take_outgoing();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(mesh.nodes[6].pending_for(&ghost).len(), 3);
}

#[test]
fn test_unknown_destination_discovery_dies_out() {
    let mut mesh = Mesh::chain(7);
    mesh.advertise_all();

    let mut rng = StdRng::seed_from_u64(8);
    let ghost = Identifier::random(&mut rng);

    mesh.nodes[6].queue_message_to(ghost, b"lost").unwrap();
    mesh.flush(6);

    for node in mesh.nodes.iter_mut() {
        assert!(node.take_incoming().is_empty());
    }
    assert_eq!(mesh.nodes[6].pending_for(&ghost).len(), 1);
}

#[test]
fn test_discovery_reaches_past_two_zones() {
    // 0 .. 9: the destination lies beyond the first border node's zone
    let mut mesh = Mesh::chain(10);
    mesh.advertise_all();

    let target = mesh.id(0);
    mesh.nodes[9].queue_message_to(target, b"far away").unwrap();
    mesh.flush(9);

    assert_eq!(mesh.nodes[0].take_incoming(), vec![b"far away".to_vec()]);

    let route = mesh.nodes[9].cached_route_to(&target).unwrap();
    assert_eq!(route.first(), Some(&mesh.id(9)));
    assert_eq!(route.last(), Some(&target));
    assert!(route.len() >= 3);

    mesh.assert_loop_free();
}

#[test]
fn test_routes_expire_without_advertisements() {
    let mut mesh = Mesh::chain(3);
    mesh.advertise_all();
    assert_eq!(mesh.hops(0, 2), Some(2));

    let interval = mesh.nodes[2].config().advertisement_interval_ms;
    mesh.clock.advance(interval + 1);
    assert_eq!(mesh.hops(0, 2), None);

    mesh.advertise_all();
    assert_eq!(mesh.hops(0, 2), Some(2));
}

#[test]
fn test_query_sealed_from_relays() {
    let mut mesh = Mesh::chain(7);
    mesh.advertise_all();

    let target = mesh.id(0);
    let packets = mesh.nodes[6].discover_device(target).unwrap();
    assert_eq!(packets.len(), 1);

    // Relays pass the sealed query on untouched; the bordercast node opens
    // it and hands it on sealed again
    let relay = mesh.nodes[5].process_datagram(&packets[0].payload);
    assert_eq!(relay.len(), 1);
    let relay = mesh.nodes[4].process_datagram(&relay[0].payload);
    assert_eq!(relay.len(), 1);

    let out = mesh.nodes[3].process_datagram(&relay[0].payload);
    assert_eq!(out.len(), 1);
    assert!(WireCodec::decode_as::<RouteDiscovery>(&out[0].payload).is_err());
}

#[test]
fn test_discovery_radius_one() {
    let config = RoutingConfig {
        zone_radius: 1,
        ..RoutingConfig::default()
    };
    let mut mesh = Mesh::new(6, config);
    for i in 1..6 {
        mesh.link(i - 1, i);
    }
    mesh.advertise_all();

    assert_eq!(mesh.hops(0, 2), Some(2));
    assert_eq!(mesh.hops(0, 3), None);
    assert_eq!(mesh.nodes[0].bordercast_nodes(), vec![mesh.id(2)]);

    let target = mesh.id(5);
    mesh.nodes[0].queue_message_to(target, b"radius one").unwrap();
    mesh.flush(0);

    assert_eq!(mesh.nodes[5].take_incoming(), vec![b"radius one".to_vec()]);
    mesh.assert_loop_free();
}

#[test]
fn test_discovery_bounded_by_route_length() {
    let config = RoutingConfig {
        max_route_length: 1,
        ..RoutingConfig::default()
    };
    let mut mesh = Mesh::new(10, config);
    for i in 1..10 {
        mesh.link(i - 1, i);
    }
    mesh.advertise_all();

    // The first border node cannot reach the target and may not extend
    // the route any further
    let target = mesh.id(0);
    let outcome = mesh.nodes[9].queue_message_to(target, b"too far").unwrap();
    assert_eq!(outcome, SendOutcome::Queued);
    mesh.flush(9);

    for node in mesh.nodes.iter_mut() {
        assert!(node.take_incoming().is_empty());
    }
    assert!(mesh.nodes[9].cached_route_to(&target).is_err());
    let requester = mesh.id(9);
    assert!(mesh.nodes[0].cached_route_to(&requester).is_err());
    assert_eq!(mesh.nodes[9].pending_for(&target), &[b"too far".to_vec()]);
}
