use std::fmt;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use super::{Error, Result};

/// Number of priority tiers
pub const TIER_COUNT: usize = 3;

/// One of the three fixed-priority queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tier(u8);

impl Tier {
    /// Commands, acknowledgements and mission traffic
    pub const CRITICAL: Tier = Tier(0);
    /// Periodic state that the operator needs to fly
    pub const IMPORTANT: Tier = Tier(1);
    /// Everything else
    pub const ROUTINE: Tier = Tier(2);

    /// All tiers in service order
    pub const ALL: [Tier; TIER_COUNT] = [Tier::CRITICAL, Tier::IMPORTANT, Tier::ROUTINE];

    /// Creates a tier, clamping to the lowest priority
    pub fn new(level: u8) -> Self {
        Tier(level.min(TIER_COUNT as u8 - 1))
    }

    /// Returns the tier level (0 is highest priority)
    pub fn level(&self) -> u8 {
        self.0
    }

    /// Returns the tier as an array index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node identifier on the radio network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u8);

impl NodeId {
    pub const GROUND: NodeId = NodeId(0);
    pub const TARGET: NodeId = NodeId(1);
    pub const RELAY_A: NodeId = NodeId(2);
    pub const RELAY_B: NodeId = NodeId(3);
    pub const BROADCAST: NodeId = NodeId(0xFF);

    /// Returns whether this is the broadcast sentinel
    pub fn is_broadcast(&self) -> bool {
        *self == NodeId::BROADCAST
    }

    /// Returns whether a packet sent to `self` should be consumed by `node`
    pub fn addresses(&self, node: NodeId) -> bool {
        *self == node || self.is_broadcast()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            NodeId::BROADCAST => write!(f, "broadcast"),
            NodeId(id) => write!(f, "{}", id),
        }
    }
}

/// Listen-before-talk and pacing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Transmit attempts before deferring to a later tick
    pub max_attempts: u32,
    /// Lower bound of every backoff draw
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub min_backoff: Duration,
    /// Upper bound of the backoff window
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub max_backoff: Duration,
    /// Settling time before sampling RSSI when CAD is inconclusive
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub listen_window: Duration,
    /// Energy below this level means the channel is clear
    pub rssi_threshold_dbm: f32,
    /// Minimum gap between two transmissions
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub inter_packet_gap: Duration,
    /// Consecutive transmissions allowed before a cooldown
    pub burst_length: u32,
    /// Cooldown after a burst so a peer can take the channel
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub burst_cooldown: Duration,
    /// Idle time after which backoff and burst state return to baseline
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub idle_reset: Duration,
}

impl Default for AccessConfig {
    fn default() -> Self {
        AccessConfig {
            max_attempts: 5,
            min_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(1000),
            listen_window: Duration::from_millis(5),
            rssi_threshold_dbm: -90.0,
            inter_packet_gap: Duration::from_millis(50),
            burst_length: 5,
            burst_cooldown: Duration::from_millis(500),
            idle_reset: Duration::from_millis(2000),
        }
    }
}

/// Relay bridge and relay radio-hop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Retries for one radio transmit on the relay hop
    pub max_retries: u32,
    /// First retry delay; doubles on every retry
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub initial_backoff: Duration,
    /// Consecutive hard failures that trigger a radio reset
    pub hard_failure_threshold: u32,
    /// A partially received frame older than this is discarded
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub inactivity_timeout: Duration,
    /// Interval between liveness frames sent to the peer hop
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub heartbeat_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            hard_failure_threshold: 10,
            inactivity_timeout: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

/// Thresholds of the three link-health watchdogs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// No radio traffic received within this window
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub link_timeout: Duration,
    /// No traffic forwarded in either direction within this window
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub relay_timeout: Duration,
    /// No frame from the peer hop within this window
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub peer_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            link_timeout: Duration::from_secs(5),
            relay_timeout: Duration::from_secs(10),
            peer_timeout: Duration::from_secs(3),
        }
    }
}

/// Configuration for a skyrelay node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// This node's radio address
    pub node_id: NodeId,
    /// Hand packets carrying the relay-request flag to the forwarding path
    pub forward_relay_requests: bool,
    /// Channel access
    pub access: AccessConfig,
    /// Relay bridge
    pub relay: RelayConfig,
    /// Watchdogs
    pub watchdog: WatchdogConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            node_id: NodeId::TARGET,
            forward_relay_requests: false,
            access: AccessConfig::default(),
            relay: RelayConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Configuration for a node with the given address
    pub fn for_node(node_id: NodeId) -> Self {
        LinkConfig {
            node_id,
            ..Default::default()
        }
    }

    /// Configuration for one hop of a two-radio relay
    pub fn relay_hop(node_id: NodeId) -> Self {
        LinkConfig {
            node_id,
            forward_relay_requests: true,
            ..Default::default()
        }
    }

    /// Checks that the run-time knobs are consistent
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_broadcast() {
            return Err(Error::config("node id cannot be the broadcast address"));
        }
        if self.access.max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }
        if self.access.min_backoff > self.access.max_backoff {
            return Err(Error::config("min_backoff exceeds max_backoff"));
        }
        if self.access.burst_length == 0 {
            return Err(Error::config("burst_length must be at least 1"));
        }
        if self.relay.hard_failure_threshold == 0 {
            return Err(Error::config("hard_failure_threshold must be at least 1"));
        }
        if self.relay.inactivity_timeout.is_zero() {
            return Err(Error::config("inactivity_timeout must be non-zero"));
        }
        Ok(())
    }
}
