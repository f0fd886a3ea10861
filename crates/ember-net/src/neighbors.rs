//! Multicast-populated table of live peers.
//!
//! Neighbors are keyed by node id - the hello payload is authoritative,
//! source addresses are just where replies go. A peer that stops beaconing
//! falls out of the table after `neighbor_timeout`; a background reaper
//! enforces the bound once per second so the table never grows past the
//! live fleet.

use ember_crdt::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Default liveness window.
pub const DEFAULT_NEIGHBOR_TIMEOUT: Duration = Duration::from_secs(9);

/// Cadence of the background reaper.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(1);

/// One live peer.
#[derive(Clone, Debug)]
pub struct Neighbor {
    pub node_id: NodeId,
    pub ip: IpAddr,
    pub data_port: u16,
    pub last_seen: Instant,
    /// `None` until the first successful send - which sorts it to the front
    /// of the gossip priority order.
    pub last_sent: Option<Instant>,
}

impl Neighbor {
    /// Unicast endpoint of this peer's data plane.
    pub fn delta_url(&self) -> String {
        format!("http://{}:{}/delta", self.ip, self.data_port)
    }

    pub fn seconds_since_seen(&self) -> f64 {
        self.last_seen.elapsed().as_secs_f64()
    }
}

pub struct NeighborTable {
    neighbors: RwLock<HashMap<NodeId, Neighbor>>,
    timeout: Duration,
}

impl NeighborTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            neighbors: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Refresh (or create) a peer entry, stamping `last_seen`.
    pub fn upsert(&self, node_id: impl Into<NodeId>, ip: IpAddr, data_port: u16) {
        let node_id = node_id.into();
        let mut table = self.neighbors.write();
        match table.get_mut(&node_id) {
            Some(neighbor) => {
                neighbor.ip = ip;
                neighbor.data_port = data_port;
                neighbor.last_seen = Instant::now();
            }
            None => {
                info!(peer = %node_id, %ip, data_port, "neighbor discovered");
                table.insert(
                    node_id.clone(),
                    Neighbor {
                        node_id,
                        ip,
                        data_port,
                        last_seen: Instant::now(),
                        last_sent: None,
                    },
                );
            }
        }
    }

    /// Peers heard from within the liveness window.
    pub fn live_neighbors(&self) -> Vec<Neighbor> {
        let now = Instant::now();
        self.neighbors
            .read()
            .values()
            .filter(|n| now.duration_since(n.last_seen) < self.timeout)
            .cloned()
            .collect()
    }

    /// Up to `k` live peers, least-recently-sent first.
    ///
    /// This fairness order is what keeps a small fanout from starving any
    /// peer: each successful send pushes the target to the back of the
    /// queue.
    pub fn prioritized(&self, k: usize) -> Vec<Neighbor> {
        let mut live = self.live_neighbors();
        live.sort_by_key(|n| n.last_sent);
        live.truncate(k);
        live
    }

    /// Stamp a successful send towards `node_id`.
    pub fn record_sent(&self, node_id: &str) {
        if let Some(neighbor) = self.neighbors.write().get_mut(node_id) {
            neighbor.last_sent = Some(Instant::now());
        }
    }

    /// Evict peers outside the liveness window; returns how many died.
    pub fn reap(&self) -> usize {
        let now = Instant::now();
        let mut table = self.neighbors.write();
        let before = table.len();
        table.retain(|node_id, n| {
            let alive = now.duration_since(n.last_seen) < self.timeout;
            if !alive {
                debug!(peer = %node_id, "neighbor timed out");
            }
            alive
        });
        before - table.len()
    }

    pub fn get(&self, node_id: &str) -> Option<Neighbor> {
        self.neighbors.read().get(node_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }
}

/// Background eviction task; runs until shutdown.
pub async fn run_reaper(table: Arc<NeighborTable>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(REAPER_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = table.reap();
                if evicted > 0 {
                    debug!(evicted, "reaped stale neighbors");
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
