//! emberfleet agent - startup glue.
//!
//! Parses the startup inputs, initializes logging, wires a [`DroneAgent`]
//! and runs it until SIGINT/SIGTERM. Interval flags are milliseconds; `-1`
//! or `0` disables the owning loop.

use clap::Parser;
use ember_net::{DroneAgent, NodeConfig};
use std::net::IpAddr;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emberfleet")]
#[command(about = "Delta-CRDT drone agent for cooperative forest-fire detection")]
#[command(version)]
struct Cli {
    /// Unique node id (default: a random drone-xxxx)
    #[arg(long)]
    node_id: Option<String>,

    /// Address the UDP and TCP listeners bind on
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// UDP multicast port; 0 disables discovery
    #[arg(long, default_value_t = 7000)]
    multicast_port: u16,

    /// TCP port of the local HTTP data plane
    #[arg(long, default_value_t = 8080)]
    data_port: u16,

    /// TCP data-plane port assumed for discovered peers
    #[arg(long, default_value_t = 8080)]
    peer_data_port: u16,

    /// Grid extent sampled by the sensor
    #[arg(long, default_value_t = 16)]
    grid_width: i32,
    #[arg(long, default_value_t = 16)]
    grid_height: i32,

    /// Sensor sample interval in ms; -1/0 disables the sensor
    #[arg(long, default_value_t = 2000)]
    sample_interval_ms: i64,

    /// Neighbors per gossip send
    #[arg(long, default_value_t = 3)]
    fanout: usize,

    /// Hop budget of freshly minted delta messages
    #[arg(long, default_value_t = 4)]
    ttl: u32,

    /// Delta push interval in ms; -1/0 disables
    #[arg(long, default_value_t = 5000)]
    delta_push_ms: i64,

    /// Anti-entropy interval in ms; -1/0 disables
    #[arg(long, default_value_t = 60_000)]
    anti_entropy_ms: i64,

    /// Hello beacon interval in ms; -1/0 disables multicast
    #[arg(long, default_value_t = 1000)]
    hello_ms: i64,

    /// Uniform jitter around each hello, in ms
    #[arg(long, default_value_t = 200)]
    hello_jitter_ms: i64,

    /// Neighbor liveness window in ms
    #[arg(long, default_value_t = 9000)]
    neighbor_timeout_ms: i64,

    /// Admission floor for sensor readings
    #[arg(long, default_value_t = 50.0)]
    confidence_threshold: f64,

    /// Dedup cache capacity; <= 0 selects the built-in default
    #[arg(long, default_value_t = 10_000)]
    dedup_capacity: isize,
}

/// `-1`/`0` map to a zero duration, which downstream reads as "disabled".
fn interval(ms: i64) -> Duration {
    if ms <= 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(ms as u64)
    }
}

impl Cli {
    fn into_config(self) -> NodeConfig {
        let mut builder = NodeConfig::builder()
            .bind_addr(self.bind)
            .multicast_port(self.multicast_port)
            .data_port(self.data_port)
            .peer_data_port(self.peer_data_port)
            .grid(self.grid_width, self.grid_height)
            .sample_interval(interval(self.sample_interval_ms))
            .fanout(self.fanout)
            .default_ttl(self.ttl)
            .delta_push_interval(interval(self.delta_push_ms))
            .anti_entropy_interval(interval(self.anti_entropy_ms))
            .hello_interval(interval(self.hello_ms))
            .hello_jitter(interval(self.hello_jitter_ms))
            .neighbor_timeout(interval(self.neighbor_timeout_ms))
            .confidence_threshold(self.confidence_threshold)
            .dedup_capacity(self.dedup_capacity);
        if let Some(node_id) = self.node_id {
            builder = builder.node_id(node_id);
        }
        builder.build()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("ctrl-c handler installed");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("sigterm handler installed")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    info!(node_id = %config.node_id, data_port = config.data_port, "emberfleet agent booting");

    let agent = DroneAgent::new(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, draining loops");
        let _ = shutdown_tx.send(true);
    });

    agent.run(shutdown_rx).await?;
    Ok(())
}
