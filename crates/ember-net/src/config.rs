//! Node configuration.
//!
//! Every tunable of the agent lives here with its protocol default. A zero
//! interval disables the owning loop (the CLI maps `-1` to zero as well).

use crate::message::{DEFAULT_DATA_PORT, DEFAULT_MULTICAST_PORT};
use crate::neighbors::DEFAULT_NEIGHBOR_TIMEOUT;
use ember_crdt::NodeId;
use ember_state::DEFAULT_CONFIDENCE_THRESHOLD;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Unique id of this drone; doubles as the CRDT replica id.
    pub node_id: NodeId,
    /// Address the UDP and TCP listeners bind on.
    pub bind_addr: IpAddr,
    /// UDP port of the multicast channel.
    pub multicast_port: u16,
    /// TCP port of the local HTTP data plane.
    pub data_port: u16,
    /// TCP port assumed for discovered peers' data planes.
    pub peer_data_port: u16,
    /// Grid extent sampled by the sensor generator.
    pub grid_width: i32,
    pub grid_height: i32,
    /// Sensor sampling cadence; zero disables the generator.
    pub sample_interval: Duration,
    /// Neighbors chosen per gossip send.
    pub fanout: usize,
    /// Hop budget of a freshly minted delta message.
    pub default_ttl: u32,
    /// Cadence of the pending-delta push; zero disables.
    pub delta_push_interval: Duration,
    /// Cadence of the full-state exchange; zero disables.
    pub anti_entropy_interval: Duration,
    /// Cadence of the hello beacon; zero disables multicast entirely.
    pub hello_interval: Duration,
    /// Uniform jitter applied around each hello.
    pub hello_jitter: Duration,
    /// Liveness window for the neighbor table.
    pub neighbor_timeout: Duration,
    /// Admission floor for sensor readings.
    pub confidence_threshold: f64,
    /// Dedup cache capacity; zero or below selects the default.
    pub dedup_capacity: isize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: format!("drone-{:04x}", rand::random::<u16>()),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            multicast_port: DEFAULT_MULTICAST_PORT,
            data_port: DEFAULT_DATA_PORT,
            peer_data_port: DEFAULT_DATA_PORT,
            grid_width: 16,
            grid_height: 16,
            sample_interval: Duration::from_secs(2),
            fanout: 3,
            default_ttl: 4,
            delta_push_interval: Duration::from_secs(5),
            anti_entropy_interval: Duration::from_secs(60),
            hello_interval: Duration::from_secs(1),
            hello_jitter: Duration::from_millis(200),
            neighbor_timeout: DEFAULT_NEIGHBOR_TIMEOUT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            dedup_capacity: 10_000,
        }
    }
}

impl NodeConfig {
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::new()
    }
}

/// Fluent builder over [`NodeConfig`].
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    pub fn node_id(mut self, id: impl Into<NodeId>) -> Self {
        self.config.node_id = id.into();
        self
    }

    pub fn bind_addr(mut self, addr: IpAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn multicast_port(mut self, port: u16) -> Self {
        self.config.multicast_port = port;
        self
    }

    pub fn data_port(mut self, port: u16) -> Self {
        self.config.data_port = port;
        self
    }

    pub fn peer_data_port(mut self, port: u16) -> Self {
        self.config.peer_data_port = port;
        self
    }

    pub fn grid(mut self, width: i32, height: i32) -> Self {
        self.config.grid_width = width;
        self.config.grid_height = height;
        self
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.config.sample_interval = interval;
        self
    }

    pub fn fanout(mut self, fanout: usize) -> Self {
        self.config.fanout = fanout;
        self
    }

    pub fn default_ttl(mut self, ttl: u32) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    pub fn delta_push_interval(mut self, interval: Duration) -> Self {
        self.config.delta_push_interval = interval;
        self
    }

    pub fn anti_entropy_interval(mut self, interval: Duration) -> Self {
        self.config.anti_entropy_interval = interval;
        self
    }

    pub fn hello_interval(mut self, interval: Duration) -> Self {
        self.config.hello_interval = interval;
        self
    }

    pub fn hello_jitter(mut self, jitter: Duration) -> Self {
        self.config.hello_jitter = jitter;
        self
    }

    pub fn neighbor_timeout(mut self, timeout: Duration) -> Self {
        self.config.neighbor_timeout = timeout;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn dedup_capacity(mut self, capacity: isize) -> Self {
        self.config.dedup_capacity = capacity;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.config
    }
}

impl Default for NodeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol() {
        let config = NodeConfig::default();
        assert_eq!(config.multicast_port, 7000);
        assert_eq!(config.data_port, 8080);
        assert_eq!(config.fanout, 3);
        assert_eq!(config.default_ttl, 4);
        assert_eq!(config.delta_push_interval, Duration::from_secs(5));
        assert_eq!(config.anti_entropy_interval, Duration::from_secs(60));
        assert_eq!(config.hello_interval, Duration::from_secs(1));
        assert_eq!(config.hello_jitter, Duration::from_millis(200));
        assert_eq!(config.neighbor_timeout, Duration::from_secs(9));
        assert_eq!(config.confidence_threshold, 50.0);
    }

    #[test]
    fn test_builder_overrides() {
        let config = NodeConfig::builder()
            .node_id("drone-1")
            .fanout(5)
            .default_ttl(2)
            .sample_interval(Duration::ZERO)
            .build();

        assert_eq!(config.node_id, "drone-1");
        assert_eq!(config.fanout, 5);
        assert_eq!(config.default_ttl, 2);
        assert!(config.sample_interval.is_zero());
    }
}
