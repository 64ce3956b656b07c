use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{LinkConfig, NodeId, Result};
use crate::queue::{PriorityQueueEngine, QueueMetrics, TickOutcome};
use crate::radio::{
    AccessStats, ChannelAccessController, InboundPacket, PacketTransceiver, RadioDriver,
    TransceiverStats,
};
use super::LinkChannel;

/// Combined counters of one narrowband link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    pub queue: QueueMetrics,
    pub access: AccessStats,
    pub transceiver: TransceiverStats,
}

/// The contended radio path: classification, tiered queueing and
/// listen-before-talk in front of one packet transceiver.
pub struct NarrowbandLink<R: RadioDriver> {
    transceiver: PacketTransceiver<R>,
    queue: PriorityQueueEngine,
    access: ChannelAccessController,
}

impl<R: RadioDriver> NarrowbandLink<R> {
    /// Validates the configuration and brings the radio up in receive mode
    pub fn new(radio: R, config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(NarrowbandLink {
            transceiver: PacketTransceiver::new(radio, config)?,
            queue: PriorityQueueEngine::new(config.node_id),
            access: ChannelAccessController::new(config.access.clone()),
        })
    }

    /// Like [`NarrowbandLink::new`] with a fixed backoff seed
    pub fn with_seed(radio: R, config: &LinkConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(NarrowbandLink {
            transceiver: PacketTransceiver::new(radio, config)?,
            queue: PriorityQueueEngine::new(config.node_id),
            access: ChannelAccessController::with_seed(config.access.clone(), seed),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.transceiver.node_id()
    }

    /// Queues a payload for `dest`. Returns false if it was rejected.
    pub fn send(&mut self, dest: NodeId, payload: &[u8]) -> bool {
        self.enqueue(dest, payload, false)
    }

    /// Queues a payload that asks relay hops to forward it
    pub fn send_relayed(&mut self, dest: NodeId, payload: &[u8]) -> bool {
        self.enqueue(dest, payload, true)
    }

    fn enqueue(&mut self, dest: NodeId, payload: &[u8], relay_request: bool) -> bool {
        match self.queue.enqueue(dest, payload, relay_request) {
            Ok(_) => true,
            Err(e) => {
                debug!("not queued for {}: {}", dest, e);
                false
            }
        }
    }

    /// Copies the waiting inbound payload into `buf`, returning its length.
    ///
    /// Returns 0 when nothing is waiting. A payload longer than `buf` is
    /// truncated.
    pub fn receive(&mut self, buf: &mut [u8]) -> usize {
        match self.transceiver.take_inbound() {
            Some(inbound) => copy_truncated(&inbound.packet.payload, buf),
            None => 0,
        }
    }

    /// Takes the waiting inbound packet with its metadata
    pub fn take_inbound(&mut self) -> Option<InboundPacket> {
        self.transceiver.take_inbound()
    }

    /// Takes the waiting packet that should be forwarded by this relay hop
    pub fn take_forward(&mut self) -> Option<InboundPacket> {
        self.transceiver.take_forward()
    }

    /// Runs one scheduling pass over the queue
    pub async fn tick(&mut self) -> TickOutcome {
        self.queue.tick(&mut self.access, &mut self.transceiver).await
    }

    pub fn queue(&self) -> &PriorityQueueEngine {
        &self.queue
    }

    pub fn transceiver(&self) -> &PacketTransceiver<R> {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut PacketTransceiver<R> {
        &mut self.transceiver
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            queue: self.queue.metrics(),
            access: self.access.stats(),
            transceiver: self.transceiver.stats(),
        }
    }
}

impl<R: RadioDriver> LinkChannel for NarrowbandLink<R> {
    fn send(&mut self, dest: NodeId, payload: &[u8]) -> bool {
        NarrowbandLink::send(self, dest, payload)
    }

    fn poll(&mut self) -> Option<Bytes> {
        self.take_inbound().map(|inbound| inbound.packet.payload)
    }
}

pub(crate) fn copy_truncated(payload: &[u8], buf: &mut [u8]) -> usize {
    let len = payload.len().min(buf.len());
    if len < payload.len() {
        debug!("truncating {} byte payload to {}", payload.len(), len);
    }
    buf[..len].copy_from_slice(&payload[..len]);
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tier;
    use crate::protocol::classifier::ids;
    use crate::protocol::message::tests::v2_frame;
    use crate::protocol::Packet;
    use crate::radio::SimulatedRadio;

    fn link(node: NodeId) -> (NarrowbandLink<SimulatedRadio>, SimulatedRadio) {
        let radio = SimulatedRadio::new();
        let link = NarrowbandLink::with_seed(radio.clone(), &LinkConfig::for_node(node), 3).unwrap();
        (link, radio)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = LinkConfig::for_node(NodeId::BROADCAST);
        assert!(NarrowbandLink::new(SimulatedRadio::new(), &config).is_err());
        config.node_id = NodeId::GROUND;
        assert!(NarrowbandLink::new(SimulatedRadio::new(), &config).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_then_tick_transmits() {
        let (mut link, radio) = link(NodeId::GROUND);
        let command = v2_frame(255, 0, ids::COMMAND_LONG, &[0; 33]);

        assert!(link.send(NodeId::TARGET, &command));
        assert_eq!(link.queue().depth(Tier::CRITICAL), 1);
        assert_eq!(link.tick().await, TickOutcome::Transmitted(Tier::CRITICAL));

        let sent = radio.sent_frames();
        assert_eq!(sent.len(), 1);
        let packet = Packet::decode(&sent[0]).unwrap();
        assert_eq!(packet.src, NodeId::GROUND);
        assert!(!packet.relay_request);
        assert_eq!(link.stats().access.sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_relayed_sets_flag() {
        let (mut link, radio) = link(NodeId::GROUND);
        assert!(link.send_relayed(NodeId::TARGET, b"far away"));
        link.tick().await;
        assert!(Packet::decode(&radio.sent_frames()[0]).unwrap().relay_request);
    }

    #[test]
    fn test_blacklisted_send_returns_false() {
        let (mut link, _) = link(NodeId::TARGET);
        assert!(!link.send(NodeId::GROUND, &v2_frame(1, 0, ids::HIGHRES_IMU, &[0; 40])));
        assert_eq!(link.stats().queue.total_depth(), 0);
    }

    #[test]
    fn test_receive_copies_and_truncates() {
        let (mut link, radio) = link(NodeId::GROUND);
        let mut buf = [0u8; 4];

        assert_eq!(link.receive(&mut buf), 0);

        let wire = Packet::new(NodeId::TARGET, NodeId::GROUND, vec![1, 2, 3, 4, 5, 6]).unwrap().to_bytes();
        radio.inject(&wire);
        assert_eq!(link.receive(&mut buf), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(link.receive(&mut buf), 0);
    }

    #[test]
    fn test_stats_serialize() {
        let (link, _) = link(NodeId::GROUND);
        let json = serde_json::to_value(link.stats()).unwrap();
        assert_eq!(json["queue"]["tiers"][0]["capacity"], 10);
        assert_eq!(json["transceiver"]["transmitted"], 0);
    }
}
