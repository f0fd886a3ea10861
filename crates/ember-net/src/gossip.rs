//! Gossip dissemination engine.
//!
//! Three flows meet here:
//!
//! 1. **Delta push** - a timer wraps the pending local delta in a
//!    [`DeltaMessage`] and fans it out; the delta is cleared once at least
//!    one neighbor accepted it (the rest is anti-entropy's problem).
//! 2. **Receive** - every inbound message passes the dedup cache, is merged
//!    into the fire state, and re-forwarded with a decremented TTL under
//!    this node's sender id. A message arriving with TTL 0 is still merged -
//!    information that made it this far is kept - but never forwarded.
//! 3. **Forward** - up to `fanout` neighbors, least-recently-sent first, so
//!    no peer starves behind a small fanout.

use crate::config::NodeConfig;
use crate::dedup::DedupCache;
use crate::error::{NetError, Result};
use crate::message::DeltaMessage;
use crate::neighbors::NeighborTable;
use crate::transport::DeltaTransport;
use ember_crdt::NodeId;
use ember_state::FireState;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Tunables the engine needs from the node configuration.
#[derive(Clone, Debug)]
pub struct GossipConfig {
    pub fanout: usize,
    pub default_ttl: u32,
    pub delta_push_interval: Duration,
    pub dedup_capacity: isize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            default_ttl: 4,
            delta_push_interval: Duration::from_secs(5),
            dedup_capacity: 10_000,
        }
    }
}

impl From<&NodeConfig> for GossipConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            fanout: config.fanout,
            default_ttl: config.default_ttl,
            delta_push_interval: config.delta_push_interval,
            dedup_capacity: config.dedup_capacity,
        }
    }
}

/// Counter snapshot served by the stats endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GossipStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
    pub anti_entropy: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    anti_entropy: AtomicU64,
}

/// What a fan-out attempt achieved.
#[derive(Debug, Default)]
pub struct ForwardOutcome {
    /// Neighbors that accepted the message.
    pub delivered: usize,
    /// First send error, if any; later errors are logged only.
    pub first_error: Option<NetError>,
}

pub struct GossipEngine {
    node_id: NodeId,
    config: GossipConfig,
    state: Arc<RwLock<FireState>>,
    neighbors: Arc<NeighborTable>,
    transport: Arc<dyn DeltaTransport>,
    dedup: DedupCache,
    counters: Counters,
}

impl GossipEngine {
    pub fn new(
        node_id: impl Into<NodeId>,
        config: GossipConfig,
        state: Arc<RwLock<FireState>>,
        neighbors: Arc<NeighborTable>,
        transport: Arc<dyn DeltaTransport>,
    ) -> Self {
        let dedup = DedupCache::new(config.dedup_capacity);
        Self {
            node_id: node_id.into(),
            config,
            state,
            neighbors,
            transport,
            dedup,
            counters: Counters::default(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<RwLock<FireState>> {
        &self.state
    }

    pub fn neighbors(&self) -> &Arc<NeighborTable> {
        &self.neighbors
    }

    pub fn transport(&self) -> &Arc<dyn DeltaTransport> {
        &self.transport
    }

    /// Mark a message id as locally seen without processing it (used for
    /// self-originated messages so echoes die on arrival).
    pub fn mark_seen(&self, id: uuid::Uuid) {
        self.dedup.insert(id);
    }

    /// Non-promoting probe, for the header short-circuit on the data plane.
    pub fn already_seen(&self, id: &uuid::Uuid) -> bool {
        self.dedup.contains(id)
    }

    /// Count a message dropped before it reached the engine (malformed
    /// body, header short-circuit).
    pub fn record_dropped(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a successful anti-entropy exchange.
    pub fn record_anti_entropy(&self) {
        self.counters.anti_entropy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> GossipStats {
        GossipStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            anti_entropy: self.counters.anti_entropy.load(Ordering::Relaxed),
        }
    }

    /// One delta-push tick: wrap the pending delta and fan it out.
    ///
    /// The delta is cleared as soon as one neighbor accepted the message;
    /// neighbors whose send failed are repaired by anti-entropy later. With
    /// no delivery at all the delta stays pending for the next tick.
    ///
    /// Returns `Ok(true)` if a delta was pushed and cleared.
    pub async fn push_pending(&self) -> Result<bool> {
        let delta = self.state.read().generate_delta();
        let Some(delta) = delta else {
            return Ok(false);
        };

        let message = DeltaMessage::new(&self.node_id, self.config.default_ttl, delta);
        // Our own broadcast must not be re-merged when it echoes back.
        self.dedup.insert(message.id);

        let outcome = self.forward(&message).await;
        if outcome.delivered > 0 {
            self.state.write().clear_delta();
            debug!(
                msg_id = %message.id,
                delivered = outcome.delivered,
                "pushed pending delta"
            );
            Ok(true)
        } else if let Some(err) = outcome.first_error {
            Err(err)
        } else {
            // No live neighbors: keep the delta for the next tick.
            Ok(false)
        }
    }

    /// Single entry point for every inbound delta message.
    pub async fn handle_message(&self, message: DeltaMessage) {
        if !self.dedup.insert(message.id) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(msg_id = %message.id, "duplicate message dropped");
            return;
        }
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if message.ttl == 0 {
            // Hop budget exhausted. The payload is still information that
            // made it here, so merge before dropping.
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            self.state.write().merge_delta(&message.payload);
            trace!(msg_id = %message.id, "ttl exhausted, merged without forwarding");
            return;
        }

        self.state.write().merge_delta(&message.payload);

        if let Some(forwarded) = message.forwarded(&self.node_id) {
            let outcome = self.forward(&forwarded).await;
            if let Some(err) = outcome.first_error {
                warn!(msg_id = %message.id, error = %err, "gossip re-forward incomplete");
            }
        }
    }

    /// Fan a message out to up to `fanout` prioritized neighbors.
    ///
    /// A failed send never aborts the loop; the first error is carried in
    /// the outcome for the caller to report.
    pub async fn forward(&self, message: &DeltaMessage) -> ForwardOutcome {
        let targets = self.neighbors.prioritized(self.config.fanout);
        let mut outcome = ForwardOutcome::default();

        for target in targets {
            match self.transport.send_delta(&target, message).await {
                Ok(()) => {
                    self.neighbors.record_sent(&target.node_id);
                    self.counters.sent.fetch_add(1, Ordering::Relaxed);
                    outcome.delivered += 1;
                }
                Err(err) => {
                    warn!(
                        peer = %target.node_id,
                        msg_id = %message.id,
                        error = %err,
                        "gossip send failed"
                    );
                    if outcome.first_error.is_none() {
                        outcome.first_error = Some(err);
                    }
                }
            }
        }
        outcome
    }
}

/// Delta-push heartbeat; runs until shutdown. A zero interval disables the
/// loop entirely.
pub async fn run_delta_push(engine: Arc<GossipEngine>, mut shutdown: watch::Receiver<bool>) {
    let interval = engine.config().delta_push_interval;
    if interval.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = engine.push_pending().await {
                    warn!(error = %err, "delta push tick failed");
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
