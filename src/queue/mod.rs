//! Outbound queueing
//!
//! Three fixed-capacity tiers served in strict priority order. Entries are
//! classified on the way in and checked for staleness on the way out.

pub mod engine;
pub mod ring;

pub use self::engine::{
    PriorityQueueEngine, QueueEntry, QueueMetrics, TickOutcome, TierMetrics, TierSpec,
    QUEUE_MEMORY_CEILING, TIER_SPECS,
};
pub use self::ring::RingBuffer;
