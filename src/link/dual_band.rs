use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::NodeId;
use crate::protocol::classify_payload;
use crate::queue::TickOutcome;
use crate::radio::RadioDriver;
use super::dedup::{DedupTable, DedupVerdict};
use super::narrowband::{copy_truncated, LinkStats, NarrowbandLink};
use super::LinkChannel;

/// Counters of the dual-band coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualBandStats {
    pub broadband_sent: u64,
    pub broadband_failed: u64,
    pub narrowband_queued: u64,
    pub narrowband_rejected: u64,
    /// Non-essential payloads kept off the narrowband channel
    pub narrowband_filtered: u64,
    pub delivered: u64,
    pub duplicates: u64,
    /// Delivered payloads without a header to deduplicate on
    pub unchecked: u64,
    pub narrowband: LinkStats,
}

/// Merges a broadband path and the narrowband link.
///
/// Everything goes out over broadband; essential traffic is also queued on
/// narrowband. Inbound payloads from either side pass one shared
/// duplicate filter keyed by sender and sequence.
pub struct DualBandCoordinator<R: RadioDriver, B: LinkChannel> {
    narrowband: NarrowbandLink<R>,
    broadband: B,
    dedup: DedupTable,
    stats: DualBandStats,
}

impl<R: RadioDriver, B: LinkChannel> DualBandCoordinator<R, B> {
    pub fn new(narrowband: NarrowbandLink<R>, broadband: B) -> Self {
        DualBandCoordinator {
            narrowband,
            broadband,
            dedup: DedupTable::new(),
            stats: DualBandStats::default(),
        }
    }

    /// Sends over broadband, and over narrowband too when essential.
    ///
    /// Returns whether at least one path accepted the payload.
    pub fn send(&mut self, dest: NodeId, payload: &[u8]) -> bool {
        let broadband = self.broadband.send(dest, payload);
        if broadband {
            self.stats.broadband_sent += 1;
        } else {
            self.stats.broadband_failed += 1;
        }

        if !classify_payload(payload).essential {
            self.stats.narrowband_filtered += 1;
            return broadband;
        }

        let narrowband = LinkChannel::send(&mut self.narrowband, dest, payload);
        if narrowband {
            self.stats.narrowband_queued += 1;
        } else {
            self.stats.narrowband_rejected += 1;
        }
        broadband || narrowband
    }

    /// Copies the next unique payload into `buf`, returning its length.
    ///
    /// Broadband is polled before narrowband. A duplicate is dropped and the
    /// other side is polled in its place, so 0 means nothing new arrived.
    pub fn receive(&mut self, buf: &mut [u8]) -> usize {
        if let Some(payload) = self.broadband.poll() {
            if let Some(len) = self.accept(&payload, buf) {
                return len;
            }
        }
        if let Some(payload) = LinkChannel::poll(&mut self.narrowband) {
            if let Some(len) = self.accept(&payload, buf) {
                return len;
            }
        }
        0
    }

    fn accept(&mut self, payload: &[u8], buf: &mut [u8]) -> Option<usize> {
        match self.dedup.check_payload(payload) {
            DedupVerdict::Duplicate => {
                self.stats.duplicates += 1;
                debug!("dropping duplicate payload");
                None
            }
            DedupVerdict::Unchecked => {
                self.stats.unchecked += 1;
                self.stats.delivered += 1;
                Some(copy_truncated(payload, buf))
            }
            DedupVerdict::Unique => {
                self.stats.delivered += 1;
                Some(copy_truncated(payload, buf))
            }
        }
    }

    /// Drives the narrowband queue; broadband sends complete immediately
    pub async fn tick(&mut self) -> TickOutcome {
        self.narrowband.tick().await
    }

    pub fn narrowband(&self) -> &NarrowbandLink<R> {
        &self.narrowband
    }

    pub fn broadband(&self) -> &B {
        &self.broadband
    }

    pub fn stats(&self) -> DualBandStats {
        DualBandStats {
            narrowband: self.narrowband.stats(),
            ..self.stats.clone()
        }
    }
}
