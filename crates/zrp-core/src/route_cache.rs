//! Inter-zone route cache
//!
//! Holds routes learned from discovery acknowledgements. Entries expire
//! after a configurable lifetime like intra-zone routes do, and adding a
//! route that is already cached refreshes it instead of duplicating it.

use crate::routing_table::{is_loop_free, prune_and_select, RouteEntry};
use crate::{Result, RoutingError};
use std::collections::HashMap;
use zrp_proto::Identifier;

/// Routes to devices outside the local zone
#[derive(Debug)]
pub struct RouteCache {
    ttl: u64,
    routes: HashMap<Identifier, Vec<RouteEntry>>,
}

impl RouteCache {
    /// Create an empty cache whose entries live for `ttl` milliseconds
    pub fn new(ttl: u64) -> Self {
        Self {
            ttl,
            routes: HashMap::new(),
        }
    }

    /// Cache a route to `destination`
    ///
    /// Routes containing a loop are ignored. Returns whether the route is
    /// now cached.
    pub fn add_route(&mut self, destination: Identifier, route: Vec<Identifier>, now: u64) -> bool {
        if route.len() < 2 || !is_loop_free(&route) {
            return false;
        }

        let valid_until = now.saturating_add(self.ttl);
        let bucket = self.routes.entry(destination).or_default();

        match bucket.iter_mut().find(|entry| entry.route == route) {
            Some(existing) => existing.valid_until = existing.valid_until.max(valid_until),
            None => bucket.push(RouteEntry { route, valid_until }),
        }

        true
    }

    /// Get the shortest live cached route
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

    /// Number of cached entries for a destination, stale ones included
    pub fn route_count(&self, id: &Identifier) -> usize {
        self.routes.get(id).map_or(0, Vec::len)
    }

    /// Every cached route, stale ones included
    pub fn routes(&self) -> impl Iterator<Item = &[Identifier]> {
        self.routes
            .values()
            .flat_map(|bucket| bucket.iter().map(|entry| entry.route.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> Identifier {
        Identifier::from_words([0, 0, 2, n])
    }

    #[test]
    fn test_shortest_cached_route() {
        let mut cache = RouteCache::new(1000);

        cache.add_route(id(9), vec![id(0), id(1), id(2), id(9)], 0);
        cache.add_route(id(9), vec![id(0), id(3), id(9)], 0);

        assert_eq!(cache.get_route_to(&id(9), 0).unwrap(), vec![id(0), id(3), id(9)]);
    }

    #[test]
    fn test_missing_route() {
        let mut cache = RouteCache::new(1000);
        let result = cache.get_route_to(&id(9), 0);

        assert!(matches!(result, Err(RoutingError::NoRouteAvailable(_))));
    }

    #[test]
    fn test_duplicate_route_refreshed() {
        let mut cache = RouteCache::new(1000);
        let route = vec![id(0), id(1), id(9)];

        cache.add_route(id(9), route.clone(), 0);
        cache.add_route(id(9), route.clone(), 800);

        assert_eq!(cache.route_count(&id(9)), 1);
        assert_eq!(cache.get_route_to(&id(9), 1500).unwrap(), route);
    }

    #[test]
    fn test_cached_routes_expire() {
        let mut cache = RouteCache::new(1000);

        cache.add_route(id(9), vec![id(0), id(1), id(9)], 0);

        assert!(cache.get_route_to(&id(9), 1000).is_ok());
        assert!(cache.get_route_to(&id(9), 1001).is_err());
        assert_eq!(cache.route_count(&id(9)), 0);
    }

    #[test]
    fn test_looping_route_ignored() {
        let mut cache = RouteCache::new(1000);

        assert!(!cache.add_route(id(9), vec![id(0), id(1), id(0), id(9)], 0));
        assert!(!cache.add_route(id(9), vec![id(0)], 0));
        assert_eq!(cache.route_count(&id(9)), 0);
    }
}
