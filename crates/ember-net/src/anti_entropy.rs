//! Periodic full-state exchange.
//!
//! Gossip is lossy: TTL extinction, partitions and dropped sends
//! all leave holes. On a slower cadence each node pushes its *entire* causal
//! state to one random live neighbor. The join is idempotent, so repair
//! costs nothing when there is nothing to repair.
//!
//! The repair message carries twice the normal hop budget: it must re-fan
//! through a possibly partitioned neighborhood.

use crate::error::Result;
use crate::gossip::GossipEngine;
use crate::message::DeltaMessage;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct AntiEntropy {
    engine: Arc<GossipEngine>,
    interval: Duration,
}

impl AntiEntropy {
    pub fn new(engine: Arc<GossipEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// One exchange: full state to one uniformly random live neighbor.
    /// Returns `Ok(true)` if a repair message went out.
    pub async fn push_once(&self) -> Result<bool> {
        let neighbors = self.engine.neighbors().live_neighbors();
        if neighbors.is_empty() {
            return Ok(false);
        }

        let full = self.engine.state().read().full_state();
        if full.is_empty() {
            return Ok(false);
        }

        let target = &neighbors[rand::thread_rng().gen_range(0..neighbors.len())];
        let ttl = 2 * self.engine.config().default_ttl;
        let message = DeltaMessage::new(self.engine.node_id(), ttl, full);
        self.engine.mark_seen(message.id);

        self.engine.transport().send_delta(target, &message).await?;
        self.engine.neighbors().record_sent(&target.node_id);
        self.engine.record_anti_entropy();
        debug!(peer = %target.node_id, msg_id = %message.id, "anti-entropy state pushed");
        Ok(true)
    }

    /// Repair heartbeat; a zero interval disables the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.push_once().await {
                        warn!(error = %err, "anti-entropy push failed");
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::GossipConfig;
    use crate::neighbors::NeighborTable;
    use crate::transport::ChannelTransport;
    use ember_state::{Cell, FireState, SensorReading};
    use parking_lot::RwLock;
    use std::net::{IpAddr, Ipv4Addr};

    fn engine(node_id: &str, transport: Arc<ChannelTransport>) -> Arc<GossipEngine> {
        Arc::new(GossipEngine::new(
            node_id,
            GossipConfig::default(),
            Arc::new(RwLock::new(FireState::new(node_id))),
            Arc::new(NeighborTable::new(Duration::from_secs(9))),
            transport,
        ))
    }

    #[tokio::test]
    async fn test_no_neighbors_skips() {
        let transport = Arc::new(ChannelTransport::new());
        let engine = engine("a", transport);
        engine
            .state()
            .write()
            .apply_reading(&SensorReading::new(Cell::new(1, 1), 1, 90.0, 70.0));

        let ae = AntiEntropy::new(engine, Duration::from_secs(60));
        assert!(!ae.push_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_state_skips() {
        let transport = Arc::new(ChannelTransport::new());
        let _inbox = transport.register("b");
        let engine = engine("a", transport);
        engine
            .neighbors()
            .upsert("b", IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

        let ae = AntiEntropy::new(engine.clone(), Duration::from_secs(60));
        assert!(!ae.push_once().await.unwrap());
        assert_eq!(engine.stats().anti_entropy, 0);
    }

    #[tokio::test]
    async fn test_push_carries_doubled_ttl_and_full_state() {
        let transport = Arc::new(ChannelTransport::new());
        let mut inbox = transport.register("b");
        let engine = engine("a", transport);
        engine
            .neighbors()
            .upsert("b", IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

        // Two detections, one already cleared from the pending delta.
        engine
            .state()
            .write()
            .apply_reading(&SensorReading::new(Cell::new(1, 1), 1, 90.0, 70.0));
        engine.state().write().clear_delta();
        engine
            .state()
            .write()
            .apply_reading(&SensorReading::new(Cell::new(2, 2), 2, 90.0, 70.0));

        let ae = AntiEntropy::new(engine.clone(), Duration::from_secs(60));
        assert!(ae.push_once().await.unwrap());

        let message = inbox.recv().await.unwrap();
        assert_eq!(message.ttl, 8);
        // Full core, not just the pending delta.
        assert_eq!(message.payload.entries.len(), 2);
        assert_eq!(engine.stats().anti_entropy, 1);
        assert!(engine.neighbors().get("b").unwrap().last_sent.is_some());
    }
}
