//! Transports: the multicast UDP channel and the reliable unicast channel.
//!
//! Multicast carries hello beacons only. Deltas ride a framed unicast
//! channel - an HTTP POST of UTF-8 JSON to the peer's `/delta` endpoint -
//! behind the [`DeltaTransport`] seam so the gossip engine never touches a
//! socket directly. A channel-backed implementation stands in for HTTP in
//! tests and simulations.

use crate::error::{NetError, Result};
use crate::message::{headers, DeltaMessage, MULTICAST_GROUP};
use crate::neighbors::Neighbor;
use async_trait::async_trait;
use ember_crdt::NodeId;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Socket buffer size for the multicast channel.
pub const MULTICAST_BUFFER_BYTES: usize = 64 * 1024;

/// Unicast request timeout.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Base backoff of the unicast retry schedule (1 s, then 2 s).
pub const RETRY_BASE: Duration = Duration::from_secs(1);

/// Retries after the initial attempt.
pub const MAX_RETRIES: u32 = 2;

/// Egress IPv4 address of this host, discovered through the routing table.
/// Connecting a UDP socket sends no packets but resolves which interface
/// would carry traffic; loopback-only hosts yield `None`.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_loopback() => Some(*addr.ip()),
        _ => None,
    }
}

/// Bind the multicast UDP socket and join the fleet group.
///
/// The group is joined on the discovered egress interface when there is one
/// (the non-loopback, multicast-capable path out of this host); otherwise
/// the kernel picks. Loopback delivery stays on so co-hosted agents hear
/// each other.
pub fn multicast_socket(bind_addr: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(MULTICAST_BUFFER_BYTES)?;
    socket.set_send_buffer_size(MULTICAST_BUFFER_BYTES)?;
    socket.bind(&SocketAddrV4::new(bind_addr, port).into())?;

    let interface = local_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED);
    socket
        .join_multicast_v4(&MULTICAST_GROUP, &interface)
        .map_err(|e| NetError::MulticastJoin(e.to_string()))?;
    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_nonblocking(true)?;

    debug!(group = %MULTICAST_GROUP, port, %interface, "joined multicast group");
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Reliable unicast delivery of delta messages to one peer.
#[async_trait]
pub trait DeltaTransport: Send + Sync + 'static {
    async fn send_delta(&self, target: &Neighbor, message: &DeltaMessage) -> Result<()>;
}

/// Production transport: JSON over HTTP POST with timeout and backoff.
pub struct HttpDeltaTransport {
    client: reqwest::Client,
}

impl HttpDeltaTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self { client })
    }

    async fn post_once(&self, url: &str, message: &DeltaMessage) -> Result<()> {
        let response = self
            .client
            .post(url)
            .header(headers::MESSAGE_ID, message.id.to_string())
            .header(headers::MESSAGE_TYPE, "delta")
            .header(headers::GOSSIP_TTL, message.ttl.to_string())
            .header(headers::DRONE_ID, message.sender_id.as_str())
            .header(headers::TIMESTAMP, message.timestamp_ms.to_string())
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetError::PeerStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeltaTransport for HttpDeltaTransport {
    async fn send_delta(&self, target: &Neighbor, message: &DeltaMessage) -> Result<()> {
        let url = target.delta_url();
        let mut attempt = 0;
        loop {
            match self.post_once(&url, message).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < MAX_RETRIES => {
                    let backoff = RETRY_BASE * 2u32.pow(attempt);
                    warn!(
                        peer = %target.node_id,
                        %url,
                        attempt,
                        error = %err,
                        "delta send failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// In-memory transport wiring agents together through channels, for tests
/// and fleet simulations. Peers are addressed by node id; a peer can be
/// marked down to exercise send-failure paths.
#[derive(Default)]
pub struct ChannelTransport {
    inboxes: RwLock<HashMap<NodeId, mpsc::UnboundedSender<DeltaMessage>>>,
    down: RwLock<HashSet<NodeId>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and hand back its inbox.
    pub fn register(&self, node_id: impl Into<NodeId>) -> mpsc::UnboundedReceiver<DeltaMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(node_id.into(), tx);
        rx
    }

    /// Simulate a partition for one peer.
    pub fn set_down(&self, node_id: &str, down: bool) {
        if down {
            self.down.write().insert(node_id.to_string());
        } else {
            self.down.write().remove(node_id);
        }
    }
}

#[async_trait]
impl DeltaTransport for ChannelTransport {
    async fn send_delta(&self, target: &Neighbor, message: &DeltaMessage) -> Result<()> {
        if self.down.read().contains(&target.node_id) {
            return Err(NetError::SendFailed(
                target.node_id.clone(),
                "peer marked down".to_string(),
            ));
        }
        let sender = self
            .inboxes
            .read()
            .get(&target.node_id)
            .cloned()
            .ok_or_else(|| NetError::UnknownPeer(target.node_id.clone()))?;
        sender
            .send(message.clone())
            .map_err(|e| NetError::SendFailed(target.node_id.clone(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_state::FireDelta;
    use std::net::IpAddr;
    use std::time::Instant;

    fn neighbor(node_id: &str) -> Neighbor {
        Neighbor {
            node_id: node_id.to_string(),
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            data_port: 8080,
            last_seen: Instant::now(),
            last_sent: None,
        }
    }

    #[test]
    fn test_delta_url_shape() {
        assert_eq!(neighbor("d1").delta_url(), "http://127.0.0.1:8080/delta");
    }

    #[tokio::test]
    async fn test_channel_transport_delivers() {
        let transport = ChannelTransport::new();
        let mut inbox = transport.register("d2");

        let message = DeltaMessage::new("d1", 4, FireDelta::default());
        transport
            .send_delta(&neighbor("d2"), &message)
            .await
            .unwrap();

        assert_eq!(inbox.recv().await.unwrap().id, message.id);
    }

    #[tokio::test]
    async fn test_channel_transport_unknown_peer() {
        let transport = ChannelTransport::new();
        let message = DeltaMessage::new("d1", 4, FireDelta::default());
        let err = transport
            .send_delta(&neighbor("ghost"), &message)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn test_channel_transport_down_peer_fails() {
        let transport = ChannelTransport::new();
        let _inbox = transport.register("d2");
        transport.set_down("d2", true);

        let message = DeltaMessage::new("d1", 4, FireDelta::default());
        assert!(transport
            .send_delta(&neighbor("d2"), &message)
            .await
            .is_err());

        transport.set_down("d2", false);
        assert!(transport
            .send_delta(&neighbor("d2"), &message)
            .await
            .is_ok());
    }
}
