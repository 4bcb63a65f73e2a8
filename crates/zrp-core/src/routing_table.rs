//! Intra-zone routing table
//!
//! Built proactively from received advertisements. Every destination keeps
//! a bucket of candidate routes, each valid until a deadline on the injected
//! clock. Staleness is checked when a route is read rather than by a
//! background task, so the table only changes in response to calls.
//!
//! Stored routes start with the local device and end with the destination;
//! the hop count of a route is `route.len() - 1`.

use crate::{Result, RoutingError};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use zrp_proto::{Advertisement, Identifier};

/// A candidate route with its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Hops from the local device to the destination, inclusive
    pub route: Vec<Identifier>,

    /// Clock value after which the route is stale
    pub valid_until: u64,
}

/// Check that no identifier appears twice in a route
pub fn is_loop_free(route: &[Identifier]) -> bool {
    let mut seen = HashSet::with_capacity(route.len());
    route.iter().all(|id| seen.insert(*id))
}

/// Drop stale entries, then pick the shortest remaining one
///
/// Among equally short routes the earliest inserted wins.
pub(crate) fn prune_and_select(bucket: &mut Vec<RouteEntry>, now: u64) -> Option<&RouteEntry> {
    bucket.retain(|entry| entry.valid_until >= now);
    bucket.iter().min_by_key(|entry| entry.route.len())
}

/// Intra-zone routing table
#[derive(Debug)]
pub struct RoutingTable {
    local: Identifier,
    bordercast_hops: usize,
    routes: HashMap<Identifier, Vec<RouteEntry>>,
    bordercast_candidates: Vec<Identifier>,
}

impl RoutingTable {
    /// Create an empty table for the local device
    ///
    /// Devices whose shortest route is `zone_radius + 1` hops long are the
    /// bordercast nodes.
    pub fn new(local: Identifier, zone_radius: usize) -> Self {
        Self {
            local,
            bordercast_hops: zone_radius + 1,
            routes: HashMap::new(),
            bordercast_candidates: Vec::new(),
        }
    }

    /// Record the route carried by an advertisement
    ///
    /// `adv.route` must already end with the local device. A route that is
    /// already stored has its deadline extended. Returns whether a route was
    /// stored.
    pub fn process_advertisement(&mut self, adv: &Advertisement, now: u64) -> bool {
        if adv.route.last() != Some(&self.local) {
            return false;
        }

        let route: Vec<Identifier> = adv
            .route
            .iter()
            .rev()
            .copied()
            .chain(std::iter::once(adv.origin))
            .collect();

        if !is_loop_free(&route) {
            return false;
        }

        let hops = route.len() - 1;
        let valid_until = now.saturating_add(adv.interval);
        let bucket = self.routes.entry(adv.origin).or_default();

        match bucket.iter_mut().find(|entry| entry.route == route) {
            Some(existing) => existing.valid_until = existing.valid_until.max(valid_until),
            None => bucket.push(RouteEntry { route, valid_until }),
        }

        if hops == self.bordercast_hops && !self.bordercast_candidates.contains(&adv.origin) {
            self.bordercast_candidates.push(adv.origin);
        }

        true
    }

    /// Get the shortest live route to a destination
    ///
    /// Stale entries are removed; if none survive the destination is
    /// forgotten.
    pub fn get_route_to(&mut self, id: &Identifier, now: u64) -> Result<Vec<Identifier>> {
        let Some(bucket) = self.routes.get_mut(id) else {
            return Err(RoutingError::NoRouteAvailable(*id));
        };

        if let Some(entry) = prune_and_select(bucket, now) {
            return Ok(entry.route.clone());
        }

        self.routes.remove(id);
        Err(RoutingError::NoRouteAvailable(*id))
    }

    /// Current bordercast nodes, minus `exclude`, in first-seen order
    ///
    /// Candidates whose routes have all gone stale are evicted.
    pub fn get_bordercast_nodes(&mut self, exclude: &[Identifier], now: u64) -> Vec<Identifier> {
        let candidates = std::mem::take(&mut self.bordercast_candidates);
        let mut retained = Vec::with_capacity(candidates.len());
        let mut border = Vec::new();

        for node in candidates {
            match self.get_route_to(&node, now) {
                Ok(route) => {
                    retained.push(node);
                    if route.len() - 1 == self.bordercast_hops && !exclude.contains(&node) {
                        border.push(node);
                    }
                }
                Err(_) => debug!(node = %node, "Evicting stale bordercast node"),
            }
        }

        self.bordercast_candidates = retained;
        border
    }

    /// Number of stored entries for a destination, stale ones included
    pub fn route_count(&self, id: &Identifier) -> usize {
        self.routes.get(id).map_or(0, Vec::len)
    }

    /// Destinations with at least one stored entry
    pub fn destinations(&self) -> impl Iterator<Item = &Identifier> {
        self.routes.keys()
    }

    /// Every stored route, stale ones included
    pub fn routes(&self) -> impl Iterator<Item = &[Identifier]> {
        self.routes
            .values()
            .flat_map(|bucket| bucket.iter().map(|entry| entry.route.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zrp_proto::PublicKey;

    fn id(n: u32) -> Identifier {
        Identifier::from_words([0, 0, 1, n])
    }

    /// Advertisement from `origin` relayed by `relays`, then received locally
    fn adv(origin: u32, relays: &[u32], local: u32, interval: u64) -> Advertisement {
        let mut route: Vec<Identifier> = relays.iter().map(|n| id(*n)).collect();
        route.push(id(local));
        Advertisement {
            origin: id(origin),
            public_key: PublicKey {
                signing: [0; 32],
                exchange: [0; 32],
            },
            route,
            interval,
        }
    }

    #[test]
    fn test_route_reversed_from_advertisement() {
        let mut table = RoutingTable::new(id(0), 2);

        assert!(table.process_advertisement(&adv(9, &[1, 2], 0, 1000), 0));

        let route = table.get_route_to(&id(9), 0).unwrap();
        assert_eq!(route, vec![id(0), id(2), id(1), id(9)]);
    }

    #[test]
    fn test_shortest_route_wins() {
        let mut table = RoutingTable::new(id(0), 2);

        table.process_advertisement(&adv(9, &[1, 2], 0, 1000), 0);
        table.process_advertisement(&adv(9, &[3], 0, 1000), 0);
        table.process_advertisement(&adv(9, &[4, 5], 0, 1000), 0);

        assert_eq!(table.get_route_to(&id(9), 0).unwrap(), vec![id(0), id(3), id(9)]);
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let mut table = RoutingTable::new(id(0), 2);

        table.process_advertisement(&adv(9, &[1], 0, 1000), 0);
        table.process_advertisement(&adv(9, &[2], 0, 1000), 0);

        assert_eq!(table.get_route_to(&id(9), 0).unwrap(), vec![id(0), id(1), id(9)]);
    }

    #[test]
    fn test_stale_routes_pruned() {
        let mut table = RoutingTable::new(id(0), 2);

        table.process_advertisement(&adv(9, &[1], 0, 100), 0);
        table.process_advertisement(&adv(9, &[2, 3], 0, 500), 0);

        // Exactly at the deadline the route is still valid
        assert_eq!(table.get_route_to(&id(9), 100).unwrap().len(), 3);

        // Short route expired, long one survives
        assert_eq!(table.get_route_to(&id(9), 101).unwrap().len(), 4);
        assert_eq!(table.route_count(&id(9)), 1);

        let result = table.get_route_to(&id(9), 501);
        assert!(matches!(result, Err(RoutingError::NoRouteAvailable(_))));
        assert_eq!(table.route_count(&id(9)), 0);
        assert_eq!(table.destinations().count(), 0);
    }

    #[test]
    fn test_repeated_advertisement_refreshes() {
        let mut table = RoutingTable::new(id(0), 2);

        table.process_advertisement(&adv(9, &[1], 0, 100), 0);
        table.process_advertisement(&adv(9, &[1], 0, 100), 80);

        assert_eq!(table.route_count(&id(9)), 1);
        assert!(table.get_route_to(&id(9), 150).is_ok());
        assert!(table.get_route_to(&id(9), 181).is_err());
    }

    #[test]
    fn test_unknown_destination() {
        let mut table = RoutingTable::new(id(0), 2);
        assert!(table.get_route_to(&id(5), 0).is_err());
    }

    #[test]
    fn test_looping_advertisement_rejected() {
        let mut table = RoutingTable::new(id(0), 2);

        assert!(!table.process_advertisement(&adv(9, &[1, 9], 0, 1000), 0));
        assert!(!table.process_advertisement(&adv(9, &[0, 1], 0, 1000), 0));
        assert!(table.get_route_to(&id(9), 0).is_err());
    }

    #[test]
    fn test_advertisement_must_end_locally() {
        let mut table = RoutingTable::new(id(0), 2);
        let mut foreign = adv(9, &[1], 0, 1000);
        foreign.route.pop();

        assert!(!table.process_advertisement(&foreign, 0));
    }

    #[test]
    fn test_bordercast_nodes() {
        let mut table = RoutingTable::new(id(0), 2);

        table.process_advertisement(&adv(1, &[], 0, 1000), 0);
        table.process_advertisement(&adv(2, &[1], 0, 1000), 0);
        table.process_advertisement(&adv(3, &[2, 1], 0, 1000), 0);
        table.process_advertisement(&adv(4, &[5, 6], 0, 1000), 0);

        assert_eq!(table.get_bordercast_nodes(&[], 0), vec![id(3), id(4)]);
        assert_eq!(table.get_bordercast_nodes(&[id(3)], 0), vec![id(4)]);
    }

    #[test]
    fn test_bordercast_follows_shortest_route() {
        let mut table = RoutingTable::new(id(0), 2);

        table.process_advertisement(&adv(3, &[2, 1], 0, 1000), 0);
        table.process_advertisement(&adv(3, &[7], 0, 100), 0);

        // A shorter route puts the node inside the zone
        assert!(table.get_bordercast_nodes(&[], 50).is_empty());

        // Once it expires the node is on the border again
        assert_eq!(table.get_bordercast_nodes(&[], 200), vec![id(3)]);
    }

    #[test]
    fn test_stale_bordercast_evicted() {
        let mut table = RoutingTable::new(id(0), 2);

        table.process_advertisement(&adv(3, &[2, 1], 0, 100), 0);
        assert_eq!(table.get_bordercast_nodes(&[], 0), vec![id(3)]);

        assert!(table.get_bordercast_nodes(&[], 101).is_empty());
        assert_eq!(table.route_count(&id(3)), 0);
    }
}
