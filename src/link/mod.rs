//! Link layer module
//!
//! A link is anything that can carry an addressed payload and hand back the
//! next received one. The narrowband link queues and contends for the shared
//! channel; a broadband path sends best-effort straight through its radio.

pub mod dedup;
pub mod dual_band;
pub mod narrowband;

pub use self::dedup::{DedupTable, DedupVerdict};
pub use self::dual_band::{DualBandCoordinator, DualBandStats};
pub use self::narrowband::{LinkStats, NarrowbandLink};

use bytes::Bytes;

use crate::core::NodeId;
use crate::radio::{PacketTransceiver, RadioDriver};

/// One path between this node and its peers
pub trait LinkChannel {
    /// Hands a payload to the link, returning whether it was accepted
    fn send(&mut self, dest: NodeId, payload: &[u8]) -> bool;

    /// Takes the next received payload, if any
    fn poll(&mut self) -> Option<Bytes>;
}

// A bare transceiver is the broadband path: no queue, no contention.
impl<R: RadioDriver> LinkChannel for PacketTransceiver<R> {
    fn send(&mut self, dest: NodeId, payload: &[u8]) -> bool {
        self.send_packet(dest, Bytes::copy_from_slice(payload), false)
    }

    fn poll(&mut self) -> Option<Bytes> {
        self.take_inbound().map(|inbound| inbound.packet.payload)
    }
}
