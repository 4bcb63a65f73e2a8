//! Node configuration

use crate::{NodeError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use zrp_core::{Identity, RoutingConfig};
use zrp_proto::Identifier;

/// A neighbour reachable over UDP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Neighbour's device identifier
    pub id: Identifier,

    /// Neighbour's UDP address
    pub address: SocketAddr,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Device identity (loaded from `identity_path`, never serialized)
    #[serde(skip, default = "default_identity")]
    pub identity: Identity,

    /// Path to identity file
    pub identity_path: PathBuf,

    /// UDP address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Neighbours in range
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// Period between own advertisements (milliseconds)
    #[serde(default = "default_advertise_every")]
    pub advertise_every_ms: u64,

    /// Routing engine tunables
    #[serde(default)]
    pub routing: RoutingConfig,
}

fn default_identity() -> Identity {
    Identity::generate(&mut rand::thread_rng())
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4870))
}

fn default_advertise_every() -> u64 {
    5_000
}

impl NodeConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: NodeConfig = toml::from_str(&contents)
            .map_err(|e| NodeError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        // Load identity
        config.identity = zrp_core::Identity::load_from_file(&config.identity_path)?;

        Ok(config)
    }

    /// Create a default configuration
    pub fn default() -> Self {
        Self {
            identity: default_identity(),
            identity_path: PathBuf::from("node.identity"),
            listen: default_listen(),
            peers: Vec::new(),
            advertise_every_ms: default_advertise_every(),
            routing: RoutingConfig::default(),
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| NodeError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Reject settings the routing engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.routing.zone_radius == 0 {
            return Err(NodeError::Config("zone_radius must be at least 1".to_string()));
        }
        if self.advertise_every_ms == 0 {
            return Err(NodeError::Config(
                "advertise_every_ms must be positive".to_string(),
            ));
        }
        if self.advertise_every_ms > self.routing.advertisement_interval_ms {
            return Err(NodeError::Config(
                "advertise_every_ms exceeds advertisement validity".to_string(),
            ));
        }
        Ok(())
    }

    /// Neighbours as (identifier, address) pairs
    pub fn peer_addresses(&self) -> impl Iterator<Item = (Identifier, SocketAddr)> + '_ {
        self.peers.iter().map(|peer| (peer.id, peer.address))
    }
}
