//! Routing engine configuration

use serde::{Deserialize, Serialize};
use zrp_proto::Advertisement;

/// Tunables of the routing engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Hops defining the proactive zone
    #[serde(default = "default_zone_radius")]
    pub zone_radius: usize,

    /// Validity of this device's advertisements (milliseconds)
    #[serde(default = "default_advertisement_interval")]
    pub advertisement_interval_ms: u64,

    /// Upper bound on the length of a forwarded discovery route
    #[serde(default = "default_max_route_length")]
    pub max_route_length: usize,

    /// Validity of discovered inter-zone routes (milliseconds)
    #[serde(default = "default_route_cache_ttl")]
    pub route_cache_ttl_ms: u64,

    /// Time after which an unanswered discovery may be reissued (milliseconds)
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_ms: u64,

    /// Maximum number of nested messages unwrapped from one datagram
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_zone_radius() -> usize {
    2
}

fn default_advertisement_interval() -> u64 {
    Advertisement::DEFAULT_INTERVAL_MS
}

fn default_max_route_length() -> usize {
    16
}

fn default_route_cache_ttl() -> u64 {
    60_000
}

fn default_discovery_timeout() -> u64 {
    10_000
}

fn default_max_nesting_depth() -> usize {
    8
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            zone_radius: default_zone_radius(),
            advertisement_interval_ms: default_advertisement_interval(),
            max_route_length: default_max_route_length(),
            route_cache_ttl_ms: default_route_cache_ttl(),
            discovery_timeout_ms: default_discovery_timeout(),
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

impl RoutingConfig {
    /// Hop count at which advertised devices become bordercast nodes
    pub fn bordercast_hops(&self) -> usize {
        self.zone_radius + 1
    }
}
