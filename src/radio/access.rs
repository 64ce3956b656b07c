use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::debug;

use crate::core::AccessConfig;
use crate::util::duration_to_millis;
use super::{ChannelActivity, Medium};

/// Result of one gated transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// The frame went on the air
    Sent,
    /// Every attempt found the channel occupied; nothing was transmitted
    ChannelBusy,
    /// The channel was clear but the radio reported a failure
    Failed,
}

/// Contention state carried between transmissions
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAccessState {
    /// Busy attempts made for the current frame
    pub retry_count: u32,
    /// Upper bound of the most recent backoff draw
    pub backoff_window: Duration,
    /// When the last frame went on the air
    pub last_transmit: Option<Instant>,
    /// Frames sent back to back since the last cooldown
    pub consecutive_transmits: u32,
}

impl ChannelAccessState {
    fn baseline(config: &AccessConfig) -> Self {
        ChannelAccessState {
            retry_count: 0,
            backoff_window: config.min_backoff,
            last_transmit: None,
            consecutive_transmits: 0,
        }
    }
}

/// Snapshot of channel access counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStats {
    pub sent: u64,
    pub failed: u64,
    pub deferred: u64,
    pub busy_scans: u64,
    pub rssi_fallbacks: u64,
    pub backoffs: u64,
    pub backoff_ms: u64,
    pub cooldowns: u64,
    pub idle_resets: u64,
}

/// Listen-before-talk with randomised, capped exponential backoff
pub struct ChannelAccessController {
    config: AccessConfig,
    state: ChannelAccessState,
    rng: StdRng,
    stats: AccessStats,
}

impl ChannelAccessController {
    /// Creates a controller seeded from the OS
    pub fn new(config: AccessConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Creates a controller with a reproducible backoff sequence
    pub fn with_seed(config: AccessConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: AccessConfig, rng: StdRng) -> Self {
        ChannelAccessController {
            state: ChannelAccessState::baseline(&config),
            config,
            rng,
            stats: AccessStats::default(),
        }
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn state(&self) -> &ChannelAccessState {
        &self.state
    }

    pub fn stats(&self) -> AccessStats {
        self.stats.clone()
    }

    /// Senses the channel.
    ///
    /// Hardware activity detection decides when it can; if it errors, the
    /// channel is sampled after the listen window and counted clear only
    /// below the RSSI threshold.
    pub async fn is_clear<M: Medium>(&mut self, medium: &mut M) -> bool {
        let clear = match medium.scan_channel() {
            ChannelActivity::Free => true,
            ChannelActivity::Busy => false,
            ChannelActivity::Error => {
                self.stats.rssi_fallbacks += 1;
                sleep(self.config.listen_window).await;
                let rssi = medium.channel_rssi();
                debug!("activity scan unavailable, rssi {:.1} dBm", rssi);
                rssi < self.config.rssi_threshold_dbm
            }
        };

        if !clear {
            self.stats.busy_scans += 1;
        }
        clear
    }

    /// Upper bound of the backoff window after `attempt` busy scans
    pub fn backoff_window(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.config
            .min_backoff
            .checked_mul(factor)
            .unwrap_or(self.config.max_backoff)
            .min(self.config.max_backoff)
    }

    /// Draws a delay uniformly from `[min_backoff, backoff_window(attempt)]`
    pub fn draw_backoff(&mut self, attempt: u32) -> Duration {
        let window = self.backoff_window(attempt);
        self.state.backoff_window = window;

        let low = self.config.min_backoff.as_micros() as u64;
        let high = window.as_micros() as u64;
        if high <= low {
            return self.config.min_backoff;
        }
        Duration::from_micros(self.rng.gen_range(low..=high))
    }

    /// Enforces the inter-packet gap, or the longer cooldown after a burst
    pub async fn wait_for_turn(&mut self) {
        let now = Instant::now();
        self.expire_idle(now);

        let last = match self.state.last_transmit {
            Some(last) => last,
            None => return,
        };

        let ready_at = if self.state.consecutive_transmits >= self.config.burst_length {
            self.stats.cooldowns += 1;
            self.state.consecutive_transmits = 0;
            last + self.config.burst_cooldown
        } else {
            last + self.config.inter_packet_gap
        };

        if ready_at > now {
            sleep_until(ready_at).await;
        }
    }

    /// Transmits `frame` once the channel is clear, backing off between busy scans.
    ///
    /// After `max_attempts` busy scans the frame is not transmitted and the
    /// caller decides whether to defer or drop it.
    pub async fn transmit_with_backoff<M: Medium>(&mut self, medium: &mut M, frame: &[u8]) -> TransmitOutcome {
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            if self.is_clear(medium).await {
                if medium.transmit_frame(frame) {
                    self.record_transmit(Instant::now());
                    return TransmitOutcome::Sent;
                }
                self.stats.failed += 1;
                return TransmitOutcome::Failed;
            }

            self.state.retry_count = attempt;
            if attempt == attempts {
                break;
            }

            let delay = self.draw_backoff(attempt);
            self.stats.backoffs += 1;
            self.stats.backoff_ms += duration_to_millis(delay);
            debug!("channel busy, attempt {}/{}, backing off {:?}", attempt, attempts, delay);
            sleep(delay).await;
        }

        self.stats.deferred += 1;
        TransmitOutcome::ChannelBusy
    }

    fn record_transmit(&mut self, now: Instant) {
        self.stats.sent += 1;
        self.state.last_transmit = Some(now);
        self.state.consecutive_transmits += 1;
        self.state.retry_count = 0;
        self.state.backoff_window = self.config.min_backoff;
    }

    fn expire_idle(&mut self, now: Instant) {
        if let Some(last) = self.state.last_transmit {
            if now.saturating_duration_since(last) > self.config.idle_reset {
                self.state = ChannelAccessState::baseline(&self.config);
                self.stats.idle_resets += 1;
            }
        }
    }
}
