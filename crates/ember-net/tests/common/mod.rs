//! In-memory fleet harness: gossip engines wired through channel transports,
//! with a pump task per node playing the role of the receive loop.

use ember_net::{ChannelTransport, GossipConfig, GossipEngine, NeighborTable};
use ember_state::{Cell, FireState, SensorReading};
use parking_lot::RwLock;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

pub struct SimNode {
    pub id: String,
    pub engine: Arc<GossipEngine>,
}

pub struct SimFleet {
    pub transport: Arc<ChannelTransport>,
    pub nodes: Vec<SimNode>,
}

impl SimFleet {
    /// Build `n` nodes named `n0..` with the given fanout and TTL. Topology
    /// starts empty; wire it with [`connect`](SimFleet::connect) or
    /// [`fully_connect`](SimFleet::fully_connect).
    pub fn new(n: usize, fanout: usize, default_ttl: u32) -> Self {
        let transport = Arc::new(ChannelTransport::new());
        let mut nodes = Vec::with_capacity(n);

        for i in 0..n {
            let id = format!("n{i}");
            let config = GossipConfig {
                fanout,
                default_ttl,
                delta_push_interval: Duration::from_secs(5),
                dedup_capacity: 10_000,
            };
            let engine = Arc::new(GossipEngine::new(
                &id,
                config,
                Arc::new(RwLock::new(FireState::new(&id))),
                Arc::new(NeighborTable::new(Duration::from_secs(9))),
                transport.clone(),
            ));

            // Receive loop: inbox straight into the engine.
            let mut inbox = transport.register(&id);
            let pump = engine.clone();
            tokio::spawn(async move {
                while let Some(message) = inbox.recv().await {
                    pump.handle_message(message).await;
                }
            });

            nodes.push(SimNode { id, engine });
        }

        Self { transport, nodes }
    }

    /// Bidirectional edge between two nodes.
    pub fn connect(&self, a: usize, b: usize) {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        self.nodes[a]
            .engine
            .neighbors()
            .upsert(&self.nodes[b].id, ip, 8080);
        self.nodes[b]
            .engine
            .neighbors()
            .upsert(&self.nodes[a].id, ip, 8080);
    }

    pub fn fully_connect(&self) {
        for a in 0..self.nodes.len() {
            for b in (a + 1)..self.nodes.len() {
                self.connect(a, b);
            }
        }
    }

    /// A line: n0 - n1 - ... - n(k-1).
    pub fn connect_line(&self) {
        for i in 1..self.nodes.len() {
            self.connect(i - 1, i);
        }
    }

    pub fn engine(&self, idx: usize) -> &Arc<GossipEngine> {
        &self.nodes[idx].engine
    }

    /// Let spawned pumps drain.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    pub fn active_cells(&self, idx: usize) -> Vec<Cell> {
        self.engine(idx).state().read().active_cells()
    }

    pub fn is_converged(&self) -> bool {
        let first = self.active_cells(0);
        self.nodes
            .iter()
            .enumerate()
            .all(|(i, _)| self.active_cells(i) == first)
    }
}

/// A reading confidently hot enough to add its cell.
pub fn hot(x: i32, y: i32) -> SensorReading {
    SensorReading::new(Cell::new(x, y), 1_000, 90.0, 70.0)
}

/// A reading confidently cool enough to remove its cell.
pub fn cool(x: i32, y: i32) -> SensorReading {
    SensorReading::new(Cell::new(x, y), 1_000, 90.0, 25.0)
}
