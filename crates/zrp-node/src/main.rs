//! ZRP Node - Zone routing device over UDP
//!
//! Runs one mesh device. Lines read from stdin of the form
//! `<identifier> <text>` are sent to that device; payloads delivered to
//! this device are printed.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zrp_core::{Identity, SystemClock, Transport, UdpTransport};
use zrp_node::{config::NodeConfig, Inbox, Node, NodeHandle, Result};
use zrp_proto::Identifier;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "node.toml")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Generate a new identity and exit
    #[arg(long)]
    generate_identity: Option<PathBuf>,

    /// UDP address to listen on (overrides config)
    #[arg(short, long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    // Handle identity generation
    if let Some(identity_path) = args.generate_identity {
        info!("Generating new identity at {:?}", identity_path);
        let identity = Identity::generate(&mut rand::thread_rng());
        identity.save_to_file(&identity_path)?;
        info!("Identity saved: {}", identity.id());
        return Ok(());
    }

    // Load or create configuration
    let mut config = if args.config.exists() {
        info!("Loading configuration from {:?}", args.config);
        NodeConfig::load_from_file(&args.config)?
    } else {
        info!("Configuration file not found, creating default configuration");

        let mut config = NodeConfig::default();

        if !config.identity_path.exists() {
            info!("Generating new node identity at {:?}", config.identity_path);
            config.identity.save_to_file(&config.identity_path)?;
        } else {
            config.identity = Identity::load_from_file(&config.identity_path)?;
        }

        config.save_to_file(&args.config)?;
        info!("Default configuration saved to {:?}", args.config);

        config
    };

    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    info!("Device identifier: {}", config.identity.id());
    info!(
        "Zone radius {}, {} configured neighbours",
        config.routing.zone_radius,
        config.peers.len()
    );

    let transport = UdpTransport::bind(config.listen, config.peer_addresses()).await?;
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let (node, handle, inbox) = Node::new(config, transport, Arc::new(SystemClock::new()));

    tokio::spawn(print_inbox(inbox));

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                error!("Node error: {}", e);
                return Err(e);
            }
        }
        result = read_commands(handle) => {
            if let Err(e) = result {
                error!("Input error: {}", e);
                return Err(e);
            }
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received"),
                Err(err) => {
                    error!("Error waiting for shutdown signal: {}", err);
                    return Err(err.into());
                }
            }
        }
    }

    Ok(())
}

/// Send each `<identifier> <text>` line from stdin
async fn read_commands(handle: NodeHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (target, text) = line.split_once(' ').unwrap_or((line, ""));
        let target: Identifier = match target.parse() {
            Ok(id) => id,
            Err(e) => {
                warn!("Invalid identifier {:?}: {}", target, e);
                continue;
            }
        };

        match handle.send(target, text.as_bytes().to_vec()).await {
            Ok(outcome) => info!("Sent to {} ({:?})", target, outcome),
            Err(e) => warn!("Failed to send to {}: {}", target, e),
        }
    }

    // Keep routing for others after stdin closes
    std::future::pending::<()>().await;
    Ok(())
}

async fn print_inbox(mut inbox: Inbox) {
    while let Some(payload) = inbox.recv().await {
        println!("{}", String::from_utf8_lossy(&payload));
    }
}
