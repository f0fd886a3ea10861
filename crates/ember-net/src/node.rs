//! Agent orchestration: one struct that owns the shared state and wires
//! every loop together.
//!
//! Tasks spawned by [`DroneAgent::run`]:
//!
//! - HTTP data plane (delta receive, sensor inject, introspection)
//! - multicast hello beacon + listener
//! - neighbor reaper
//! - delta push heartbeat
//! - anti-entropy heartbeat
//! - sensor simulator
//!
//! Shutdown is cooperative: flipping the watch channel stops every loop at
//! its next suspension point, the join set drains, `run` returns.

use crate::anti_entropy::AntiEntropy;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::gossip::{self, GossipConfig, GossipEngine};
use crate::hello::HelloLoop;
use crate::http::{self, ApiContext};
use crate::message::MULTICAST_GROUP;
use crate::neighbors::{self, NeighborTable};
use crate::sensor::SensorSimulator;
use crate::transport::{self, DeltaTransport, HttpDeltaTransport};
use ember_state::{AdmissionPolicy, FireState};
use parking_lot::RwLock;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub struct DroneAgent {
    config: NodeConfig,
    state: Arc<RwLock<FireState>>,
    neighbors: Arc<NeighborTable>,
    engine: Arc<GossipEngine>,
}

impl DroneAgent {
    /// Production wiring: HTTP unicast transport.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let transport = Arc::new(HttpDeltaTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Custom transport seam, used by simulations and tests.
    pub fn with_transport(config: NodeConfig, transport: Arc<dyn DeltaTransport>) -> Self {
        let policy = AdmissionPolicy {
            confidence_threshold: config.confidence_threshold,
            ..AdmissionPolicy::default()
        };
        let state = Arc::new(RwLock::new(FireState::with_policy(
            &config.node_id,
            policy,
        )));
        let neighbors = Arc::new(NeighborTable::new(config.neighbor_timeout));
        let engine = Arc::new(GossipEngine::new(
            &config.node_id,
            GossipConfig::from(&config),
            state.clone(),
            neighbors.clone(),
            transport,
        ));
        Self {
            config,
            state,
            neighbors,
            engine,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<GossipEngine> {
        &self.engine
    }

    pub fn state(&self) -> &Arc<RwLock<FireState>> {
        &self.state
    }

    pub fn neighbors(&self) -> &Arc<NeighborTable> {
        &self.neighbors
    }

    /// Run the agent until the shutdown signal fires.
    ///
    /// Socket binds happen up front and abort startup on failure; everything
    /// after that is supervised until shutdown.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(node_id = %self.config.node_id, "agent starting");
        let mut tasks: JoinSet<()> = JoinSet::new();

        // Data plane. Bind failure is fatal.
        let addr = SocketAddr::new(self.config.bind_addr, self.config.data_port);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let ctx = ApiContext::new(self.engine.clone());
        let http_shutdown = shutdown.clone();
        tasks.spawn(async move {
            if let Err(err) = http::serve(listener, ctx, http_shutdown).await {
                warn!(error = %err, "data plane stopped with error");
            }
        });

        // Discovery. Multicast join failure is fatal; a zero hello interval
        // or port disables the channel entirely.
        if !self.config.hello_interval.is_zero() && self.config.multicast_port != 0 {
            let bind_v4 = match self.config.bind_addr {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
            };
            let socket = Arc::new(transport::multicast_socket(
                bind_v4,
                self.config.multicast_port,
            )?);
            let group = SocketAddrV4::new(MULTICAST_GROUP, self.config.multicast_port);
            let hello = Arc::new(HelloLoop::new(
                &self.config.node_id,
                socket,
                group,
                self.config.hello_interval,
                self.config.hello_jitter,
                self.neighbors.clone(),
                transport::local_ipv4(),
                self.config.peer_data_port,
            ));
            tasks.spawn(hello.clone().run_beacon(shutdown.clone()));
            tasks.spawn(hello.run_listener(shutdown.clone()));
        }

        tasks.spawn(neighbors::run_reaper(self.neighbors.clone(), shutdown.clone()));
        tasks.spawn(gossip::run_delta_push(self.engine.clone(), shutdown.clone()));
        tasks.spawn(
            AntiEntropy::new(self.engine.clone(), self.config.anti_entropy_interval)
                .run(shutdown.clone()),
        );

        if !self.config.sample_interval.is_zero() {
            tasks.spawn(
                SensorSimulator::new(
                    self.state.clone(),
                    self.config.grid_width,
                    self.config.grid_height,
                    self.config.sample_interval,
                )
                .run(shutdown.clone()),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "agent task aborted");
            }
        }
        info!(node_id = %self.config.node_id, "agent stopped");
        Ok(())
    }
}
