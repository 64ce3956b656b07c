use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::core::{Error, NodeId, Result, Tier, MAX_PAYLOAD_SIZE};
use crate::core::types::TIER_COUNT;
use crate::protocol::{classify_payload, Classifier, MessageHeader, Packet};
use crate::radio::{ChannelAccessController, Medium, TransmitOutcome};
use super::ring::RingBuffer;

/// Fixed shape of one tier
#[derive(Debug, Clone, Copy)]
pub struct TierSpec {
    /// Usable slots
    pub capacity: usize,
    /// Entries older than this are dropped instead of sent
    pub timeout: Duration,
}

/// Tier shapes, highest priority first
pub const TIER_SPECS: [TierSpec; TIER_COUNT] = [
    TierSpec { capacity: 10, timeout: Duration::from_millis(1000) },
    TierSpec { capacity: 20, timeout: Duration::from_millis(3000) },
    TierSpec { capacity: 30, timeout: Duration::from_millis(5000) },
];

/// Hard ceiling on memory reserved by all tier buffers
pub const QUEUE_MEMORY_CEILING: usize = 24 * 1024;

/// Bytes reserved by the tier buffers, including each ring's spare slot
pub const QUEUE_MEMORY_RESERVED: usize = (TIER_SPECS[0].capacity + 1
    + TIER_SPECS[1].capacity + 1
    + TIER_SPECS[2].capacity + 1)
    * std::mem::size_of::<Option<QueueEntry>>();

const _: () = assert!(
    TIER_SPECS[0].timeout.as_millis() <= TIER_SPECS[1].timeout.as_millis()
        && TIER_SPECS[1].timeout.as_millis() <= TIER_SPECS[2].timeout.as_millis(),
    "tier timeouts must not decrease with priority"
);

const _: () = assert!(
    QUEUE_MEMORY_RESERVED <= QUEUE_MEMORY_CEILING,
    "tier buffers exceed the queue memory ceiling"
);

/// A queued payload, owned by exactly one tier buffer until sent or dropped
#[derive(Debug, Clone)]
pub struct QueueEntry {
    payload: [u8; MAX_PAYLOAD_SIZE],
    len: u8,
    pub dest: NodeId,
    pub enqueued_at: Instant,
    pub tier: Tier,
    pub relay_request: bool,
}

impl QueueEntry {
    fn new(dest: NodeId, payload: &[u8], tier: Tier, relay_request: bool, now: Instant) -> Self {
        let mut buf = [0u8; MAX_PAYLOAD_SIZE];
        buf[..payload.len()].copy_from_slice(payload);
        QueueEntry {
            payload: buf,
            len: payload.len() as u8,
            dest,
            enqueued_at: now,
            tier,
            relay_request,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }

    fn to_packet(&self, src: NodeId) -> Packet {
        Packet {
            relay_request: self.relay_request,
            src,
            dest: self.dest,
            payload: Bytes::copy_from_slice(self.payload()),
        }
    }
}

/// Per-tier counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMetrics {
    pub depth: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub transmitted: u64,
    pub deferred: u64,
    pub dropped_full: u64,
    pub dropped_stale: u64,
}

/// Snapshot of the queue engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub tiers: [TierMetrics; TIER_COUNT],
    pub blacklisted: u64,
    pub blacklisted_by_id: BTreeMap<u32, u64>,
    pub rate_limited: u64,
    pub oversized: u64,
}

impl QueueMetrics {
    /// Entries waiting across all tiers
    pub fn total_depth(&self) -> usize {
        self.tiers.iter().map(|t| t.depth).sum()
    }
}

/// What one scheduling pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every tier was empty
    Idle,
    /// The head of this tier went on the air
    Transmitted(Tier),
    /// The head of this tier could not be sent and stays queued
    Deferred(Tier),
    /// The head of this tier had expired and was dropped
    DroppedStale(Tier),
}

struct TierQueue {
    spec: TierSpec,
    ring: RingBuffer<QueueEntry>,
    metrics: TierMetrics,
}

impl TierQueue {
    fn new(spec: TierSpec) -> Self {
        TierQueue {
            spec,
            ring: RingBuffer::new(spec.capacity),
            metrics: TierMetrics {
                capacity: spec.capacity,
                ..TierMetrics::default()
            },
        }
    }
}

/// Three strict-priority tiers with staleness eviction
pub struct PriorityQueueEngine {
    node_id: NodeId,
    tiers: [TierQueue; TIER_COUNT],
    classifier: Classifier,
    blacklisted_by_id: BTreeMap<u32, u64>,
    rate_limited: u64,
    oversized: u64,
}

impl PriorityQueueEngine {
    /// Creates an engine sending as `node_id`
    pub fn new(node_id: NodeId) -> Self {
        PriorityQueueEngine {
            node_id,
            tiers: TIER_SPECS.map(TierQueue::new),
            classifier: Classifier::new(),
            blacklisted_by_id: BTreeMap::new(),
            rate_limited: 0,
            oversized: 0,
        }
    }

    /// Classifies and queues a payload
    pub fn enqueue(&mut self, dest: NodeId, payload: &[u8], relay_request: bool) -> Result<Tier> {
        self.enqueue_at(dest, payload, relay_request, Instant::now())
    }

    /// Classifies and queues a payload with an explicit timestamp.
    ///
    /// A full tier rejects the new entry and leaves its contents untouched.
    pub fn enqueue_at(&mut self, dest: NodeId, payload: &[u8], relay_request: bool, now: Instant) -> Result<Tier> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            self.oversized += 1;
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let message_id = MessageHeader::message_id(payload);
        let class = classify_payload(payload);

        if let Some(id) = message_id {
            if class.blacklisted {
                *self.blacklisted_by_id.entry(id).or_insert(0) += 1;
                debug!("message {} is blacklisted on this link", id);
                return Err(Error::Blacklisted(id));
            }
            if self.classifier.is_limited(id, now) {
                self.rate_limited += 1;
                return Err(Error::RateLimited(id));
            }
        }

        let queue = &mut self.tiers[class.tier.index()];
        let entry = QueueEntry::new(dest, payload, class.tier, relay_request, now);
        if queue.ring.push(entry).is_err() {
            queue.metrics.dropped_full += 1;
            debug!("tier {} full, rejecting packet for {}", class.tier, dest);
            return Err(Error::QueueFull { tier: class.tier });
        }

        queue.metrics.enqueued += 1;
        if let Some(id) = message_id {
            self.classifier.record_send(id, now);
        }
        Ok(class.tier)
    }

    /// Services the highest non-empty tier once.
    ///
    /// A lower tier is only looked at when every higher tier is empty, so a
    /// head that keeps deferring blocks the tiers below it.
    pub async fn tick<M: Medium>(&mut self, access: &mut ChannelAccessController, medium: &mut M) -> TickOutcome {
        let tier = match Tier::ALL.iter().copied().find(|t| !self.tiers[t.index()].ring.is_empty()) {
            Some(tier) => tier,
            None => return TickOutcome::Idle,
        };

        let queue = &mut self.tiers[tier.index()];
        let packet = match queue.ring.front() {
            Some(head) => {
                if Instant::now().saturating_duration_since(head.enqueued_at) > queue.spec.timeout {
                    queue.ring.pop();
                    queue.metrics.dropped_stale += 1;
                    debug!("dropping stale tier {} entry", tier);
                    return TickOutcome::DroppedStale(tier);
                }
                head.to_packet(self.node_id)
            }
            None => return TickOutcome::Idle,
        };

        access.wait_for_turn().await;
        let outcome = access.transmit_with_backoff(medium, &packet.to_bytes()).await;

        let queue = &mut self.tiers[tier.index()];
        match outcome {
            TransmitOutcome::Sent => {
                queue.ring.pop();
                queue.metrics.transmitted += 1;
                TickOutcome::Transmitted(tier)
            }
            TransmitOutcome::ChannelBusy | TransmitOutcome::Failed => {
                queue.metrics.deferred += 1;
                TickOutcome::Deferred(tier)
            }
        }
    }

    /// Entries waiting in one tier
    pub fn depth(&self, tier: Tier) -> usize {
        self.tiers[tier.index()].ring.len()
    }

    /// Borrows the head of a tier
    pub fn peek(&self, tier: Tier) -> Option<&QueueEntry> {
        self.tiers[tier.index()].ring.front()
    }

    /// Drops everything queued
    pub fn clear(&mut self) {
        for queue in &mut self.tiers {
            queue.ring.clear();
        }
    }

    /// Returns a snapshot of the counters
    pub fn metrics(&self) -> QueueMetrics {
        let tiers = [0, 1, 2].map(|i| {
            let queue = &self.tiers[i];
            TierMetrics {
                depth: queue.ring.len(),
                ..queue.metrics.clone()
            }
        });

        QueueMetrics {
            tiers,
            blacklisted: self.blacklisted_by_id.values().sum(),
            blacklisted_by_id: self.blacklisted_by_id.clone(),
            rate_limited: self.rate_limited,
            oversized: self.oversized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LinkConfig;
    use crate::protocol::classifier::ids;
    use crate::protocol::message::tests::v2_frame;
    use crate::radio::{PacketTransceiver, SimulatedRadio};

    fn setup() -> (PriorityQueueEngine, ChannelAccessController, PacketTransceiver<SimulatedRadio>, SimulatedRadio) {
        let config = LinkConfig::for_node(NodeId::TARGET);
        let radio = SimulatedRadio::new();
        let xcvr = PacketTransceiver::new(radio.clone(), &config).unwrap();
        let access = ChannelAccessController::with_seed(config.access.clone(), 11);
        (PriorityQueueEngine::new(config.node_id), access, xcvr, radio)
    }

    fn command(seq: u8) -> Vec<u8> {
        v2_frame(1, seq, ids::COMMAND_LONG, &[0; 12])
    }

    #[test]
    fn test_tier_invariants() {
        for pair in TIER_SPECS.windows(2) {
            assert!(pair[0].timeout <= pair[1].timeout);
        }
        assert!(QUEUE_MEMORY_RESERVED <= QUEUE_MEMORY_CEILING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_tier_rejects_newcomer() {
        let (mut engine, ..) = setup();

        for seq in 0..10 {
            assert_eq!(engine.enqueue(NodeId::GROUND, &command(seq), false).unwrap(), Tier::CRITICAL);
        }
        let err = engine.enqueue(NodeId::GROUND, &command(10), false).unwrap_err();
        assert!(matches!(err, Error::QueueFull { tier: Tier::CRITICAL }));

        let metrics = engine.metrics();
        assert_eq!(metrics.tiers[0].dropped_full, 1);
        assert_eq!(metrics.tiers[0].depth, 10);
        // The oldest entry survived
        assert_eq!(MessageHeader::parse(engine.peek(Tier::CRITICAL).unwrap().payload()).unwrap().sequence, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blacklist_and_rate_limit_leave_no_trace() {
        let (mut engine, ..) = setup();

        let imu = v2_frame(1, 0, ids::RAW_IMU, &[0; 20]);
        assert!(matches!(engine.enqueue(NodeId::GROUND, &imu, false), Err(Error::Blacklisted(27))));

        let heartbeat = v2_frame(1, 1, ids::HEARTBEAT, &[0; 9]);
        assert!(engine.enqueue(NodeId::GROUND, &heartbeat, false).is_ok());
        assert!(matches!(engine.enqueue(NodeId::GROUND, &heartbeat, false), Err(Error::RateLimited(0))));

        let metrics = engine.metrics();
        assert_eq!(metrics.blacklisted, 1);
        assert_eq!(metrics.blacklisted_by_id.get(&ids::RAW_IMU), Some(&1));
        assert_eq!(metrics.rate_limited, 1);
        assert_eq!(metrics.total_depth(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_tier_leaves_rate_window_open() {
        let (mut engine, mut access, mut xcvr, _radio) = setup();

        for seq in 0..20 {
            let status = v2_frame(1, seq, ids::STATUSTEXT, &[0; 20]);
            assert_eq!(engine.enqueue(NodeId::GROUND, &status, false).unwrap(), Tier::IMPORTANT);
        }
        let heartbeat = v2_frame(1, 20, ids::HEARTBEAT, &[0; 9]);
        assert!(matches!(
            engine.enqueue(NodeId::GROUND, &heartbeat, false),
            Err(Error::QueueFull { tier: Tier::IMPORTANT })
        ));

        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Transmitted(Tier::IMPORTANT));
        assert_eq!(engine.enqueue(NodeId::GROUND, &heartbeat, false).unwrap(), Tier::IMPORTANT);
        assert!(matches!(engine.enqueue(NodeId::GROUND, &heartbeat, false), Err(Error::RateLimited(0))));
        assert_eq!(engine.metrics().rate_limited, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_payload_rejected() {
        let (mut engine, ..) = setup();
        let err = engine.enqueue(NodeId::GROUND, &[0u8; 300], false).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
        assert_eq!(engine.metrics().oversized, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_priority_order() {
        let (mut engine, mut access, mut xcvr, radio) = setup();

        engine.enqueue(NodeId::GROUND, &[0xAB; 4], false).unwrap();
        engine.enqueue(NodeId::GROUND, &v2_frame(1, 2, ids::STATUSTEXT, b"armed"), false).unwrap();
        engine.enqueue(NodeId::GROUND, &command(3), true).unwrap();

        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Transmitted(Tier::CRITICAL));
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Transmitted(Tier::IMPORTANT));
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Transmitted(Tier::ROUTINE));
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Idle);

        let sent = radio.sent_frames();
        let first = Packet::decode(&sent[0]).unwrap();
        assert!(first.relay_request);
        assert_eq!(first.src, NodeId::TARGET);
        assert_eq!(first.dest, NodeId::GROUND);
        assert_eq!(&first.payload[..], &command(3)[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_head_starves_lower_tiers() {
        let (mut engine, mut access, mut xcvr, radio) = setup();
        radio.set_channel_busy(true);

        engine.enqueue(NodeId::GROUND, &command(0), false).unwrap();
        engine.enqueue(NodeId::GROUND, &[0x01; 8], false).unwrap();

        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Deferred(Tier::CRITICAL));
        assert_eq!(engine.depth(Tier::CRITICAL), 1);
        assert_eq!(engine.depth(Tier::ROUTINE), 1);
        assert!(radio.sent_frames().is_empty());

        // Once the head expires the routine entry gets its turn
        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::DroppedStale(Tier::CRITICAL));
        radio.set_channel_busy(false);
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Transmitted(Tier::ROUTINE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_dropped_after_timeout() {
        let (mut engine, mut access, mut xcvr, radio) = setup();
        radio.set_channel_busy(true);

        engine.enqueue(NodeId::GROUND, &[0x02; 16], false).unwrap();
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Deferred(Tier::ROUTINE));

        tokio::time::advance(Duration::from_millis(5001)).await;
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::DroppedStale(Tier::ROUTINE));

        let metrics = engine.metrics();
        assert_eq!(metrics.tiers[2].dropped_stale, 1);
        assert_eq!(metrics.tiers[2].deferred, 1);
        assert_eq!(metrics.total_depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_transmit_keeps_entry() {
        let (mut engine, mut access, mut xcvr, radio) = setup();
        radio.fail_transmits(1);

        engine.enqueue(NodeId::GROUND, &command(0), false).unwrap();
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Deferred(Tier::CRITICAL));
        assert_eq!(engine.tick(&mut access, &mut xcvr).await, TickOutcome::Transmitted(Tier::CRITICAL));
        assert_eq!(radio.sent_frames().len(), 1);
    }
}
