//! skyrelay: prioritised transport for telemetry and command links over
//! long-range, half-duplex radio
//!
//! Outbound payloads are classified by their encapsulated message id, queued
//! in three strict-priority tiers and put on the air only after
//! listen-before-talk. Inbound packets are filtered by address and handed to
//! the main loop through single-slot mailboxes. A dual-band coordinator adds an
//! opportunistic broadband path with duplicate suppression, and a relay hop
//! forwards traffic between two radios joined by a checksummed UART bridge.
pub mod core;
pub mod link;
pub mod protocol;
pub mod queue;
pub mod radio;
pub mod relay;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Error, LinkConfig, NodeId, Result, Tier};
pub use crate::link::{DualBandCoordinator, LinkChannel, NarrowbandLink};
pub use crate::queue::PriorityQueueEngine;
pub use crate::radio::{ChannelAccessController, PacketTransceiver, RadioDriver};
pub use crate::relay::{RelayCodec, RelayHop};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
