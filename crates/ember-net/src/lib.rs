//! Ember Net - dissemination fabric of the drone fleet
//!
//! Everything between the replicated [`FireState`](ember_state::FireState)
//! and the wire:
//!
//! - [`message`] - hello and delta wire formats
//! - [`neighbors`] - multicast-populated table of live peers
//! - [`hello`] - periodic presence beacon with jitter
//! - [`dedup`] - LRU cache breaking gossip forwarding cycles
//! - [`gossip`] - TTL-bounded fan-out with neighbor fairness
//! - [`anti_entropy`] - periodic full-state repair
//! - [`transport`] - multicast UDP plus the unicast delta channel
//! - [`http`] - the HTTP data plane
//! - [`sensor`] - simulated reading source
//! - [`node`] - agent orchestration
//! - [`config`] - node configuration

pub mod anti_entropy;
pub mod config;
pub mod dedup;
pub mod error;
pub mod gossip;
pub mod hello;
pub mod http;
pub mod message;
pub mod neighbors;
pub mod node;
pub mod sensor;
pub mod transport;

pub use anti_entropy::AntiEntropy;
pub use config::{NodeConfig, NodeConfigBuilder};
pub use dedup::{DedupCache, DEFAULT_DEDUP_CAPACITY};
pub use error::{NetError, Result};
pub use gossip::{GossipConfig, GossipEngine, GossipStats};
pub use hello::HelloLoop;
pub use http::ApiContext;
pub use message::{DeltaMessage, HelloMessage, DEFAULT_DATA_PORT, DEFAULT_MULTICAST_PORT, MULTICAST_GROUP};
pub use neighbors::{Neighbor, NeighborTable, DEFAULT_NEIGHBOR_TIMEOUT};
pub use node::DroneAgent;
pub use sensor::SensorSimulator;
pub use transport::{ChannelTransport, DeltaTransport, HttpDeltaTransport};
