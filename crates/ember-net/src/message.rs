//! Wire messages: the multicast hello beacon and the gossiped delta unit.
//!
//! Both formats are UTF-8 JSON. Hellos ride the multicast group; delta
//! messages ride the unicast channel as an HTTP POST to `/delta`. Unknown
//! fields are ignored on receive.

use ember_crdt::NodeId;
use ember_state::FireDelta;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use uuid::Uuid;

/// Multicast group the fleet announces itself on.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 118);

/// Default UDP port of the multicast channel.
pub const DEFAULT_MULTICAST_PORT: u16 = 7000;

/// Conventional TCP port of a peer's data plane, unless overridden.
pub const DEFAULT_DATA_PORT: u16 = 8080;

/// Message-level metadata attached to every outbound unicast send, so
/// receivers can short-circuit dedup before decoding the body.
pub mod headers {
    pub const MESSAGE_ID: &str = "X-Message-ID";
    pub const MESSAGE_TYPE: &str = "X-Message-Type";
    pub const GOSSIP_TTL: &str = "X-Gossip-TTL";
    pub const DRONE_ID: &str = "X-Drone-ID";
    pub const TIMESTAMP: &str = "X-Timestamp";
}

/// Periodic presence beacon: `{"id":"<node_id>"}`. The sender's address is
/// taken from the UDP source, not the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub id: NodeId,
}

/// Atomic gossip unit: a fire delta wrapped with routing metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaMessage {
    pub id: Uuid,
    pub ttl: u32,
    pub sender_id: NodeId,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(rename = "data")]
    pub payload: FireDelta,
}

impl DeltaMessage {
    pub fn new(sender_id: impl Into<NodeId>, ttl: u32, payload: FireDelta) -> Self {
        Self {
            id: Uuid::new_v4(),
            ttl,
            sender_id: sender_id.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            payload,
        }
    }

    /// Copy for re-forwarding: same id and payload, decremented TTL, the
    /// forwarding node as sender. `None` once the hop budget is exhausted.
    pub fn forwarded(&self, sender_id: &str) -> Option<Self> {
        if self.ttl == 0 {
            return None;
        }
        Some(Self {
            id: self.id,
            ttl: self.ttl - 1,
            sender_id: sender_id.to_string(),
            timestamp_ms: self.timestamp_ms,
            payload: self.payload.clone(),
        })
    }
}
