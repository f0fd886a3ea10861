//! Multicast hello beacon and listener.
//!
//! Every `hello_interval ± hello_jitter` the node announces itself on the
//! fleet group; every received announcement refreshes the neighbor table.
//! Self-announcements are suppressed twice over: a cheap source-IP check
//! against the discovered egress address first, then the node-id in the
//! payload as the authoritative filter (source IPs lie behind NATs and on
//! multi-homed hosts).

use crate::message::HelloMessage;
use crate::neighbors::NeighborTable;
use ember_crdt::NodeId;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{trace, warn};

/// Receive buffer for hello frames; announcements are tiny.
const HELLO_FRAME_BYTES: usize = 2048;

pub struct HelloLoop {
    node_id: NodeId,
    socket: Arc<UdpSocket>,
    group: SocketAddrV4,
    interval: Duration,
    jitter: Duration,
    neighbors: Arc<NeighborTable>,
    local_ip: Option<Ipv4Addr>,
    peer_data_port: u16,
}

impl HelloLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: impl Into<NodeId>,
        socket: Arc<UdpSocket>,
        group: SocketAddrV4,
        interval: Duration,
        jitter: Duration,
        neighbors: Arc<NeighborTable>,
        local_ip: Option<Ipv4Addr>,
        peer_data_port: u16,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            socket,
            group,
            interval,
            jitter,
            neighbors,
            local_ip,
            peer_data_port,
        }
    }

    /// Beacon task: announce on the group until shutdown.
    pub async fn run_beacon(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if self.interval.is_zero() {
            return;
        }
        let frame = match serde_json::to_vec(&HelloMessage {
            id: self.node_id.clone(),
        }) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "hello beacon could not encode, loop disabled");
                return;
            }
        };

        loop {
            let pause = jittered(self.interval, self.jitter);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {
                    if let Err(err) = self.socket.send_to(&frame, self.group).await {
                        warn!(error = %err, "hello beacon send failed");
                    } else {
                        trace!(group = %self.group, "hello sent");
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Listener task: feed the neighbor table until shutdown.
    pub async fn run_listener(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut buf = [0u8; HELLO_FRAME_BYTES];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, src)) => self.handle_frame(&buf[..len], src),
                        Err(err) => warn!(error = %err, "hello receive failed"),
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    fn handle_frame(&self, frame: &[u8], src: SocketAddr) {
        // First pass: our own egress address means our own beacon.
        if let Some(local) = self.local_ip {
            if src.ip() == IpAddr::V4(local) {
                return;
            }
        }

        let hello: HelloMessage = match serde_json::from_slice(frame) {
            Ok(hello) => hello,
            Err(err) => {
                warn!(%src, error = %err, "malformed hello dropped");
                return;
            }
        };

        // Authoritative self-filter.
        if hello.id == self.node_id {
            return;
        }

        trace!(peer = %hello.id, %src, "hello received");
        self.neighbors.upsert(hello.id, src.ip(), self.peer_data_port);
    }
}

/// Uniform jitter in `[interval - jitter, interval + jitter]`, floored at
/// zero.
fn jittered(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    let jitter_ms = jitter.as_millis() as i64;
    let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
    let base = interval.as_millis() as i64;
    Duration::from_millis((base + offset).max(0) as u64)
}
