use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::core::RelayConfig;
use crate::radio::{ChannelAccessController, Medium, TransmitOutcome};

/// Counters of the relay transmit path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStats {
    pub sent: u64,
    pub failed_attempts: u64,
    /// Attempts that never got the channel
    pub channel_busy: u64,
    /// Frames abandoned after every attempt failed
    pub abandoned: u64,
    pub radio_resets: u64,
}

/// Bounded retry with doubling backoff for relayed transmissions.
///
/// Every attempt goes through listen-before-talk. Radio failures on a clear
/// channel are counted across calls; reaching the configured threshold resets
/// the radio and starts the count again. A busy channel uses up an attempt
/// but is not a radio fault.
#[derive(Debug)]
pub struct RadioRetry {
    config: RelayConfig,
    max_backoff: Duration,
    consecutive_failures: u32,
    stats: RetryStats,
}

impl RadioRetry {
    pub fn new(config: RelayConfig, max_backoff: Duration) -> Self {
        RadioRetry {
            config,
            max_backoff,
            consecutive_failures: 0,
            stats: RetryStats::default(),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn stats(&self) -> RetryStats {
        self.stats.clone()
    }

    /// Transmits `frame` once `access` grants the channel, retrying up to the configured count
    pub async fn transmit_with_retry<M: Medium>(
        &mut self,
        access: &mut ChannelAccessController,
        medium: &mut M,
        frame: &[u8],
    ) -> bool {
        let attempts = self.config.max_retries.max(1);
        let mut backoff = self.config.initial_backoff.min(self.max_backoff);

        for attempt in 1..=attempts {
            access.wait_for_turn().await;
            match access.transmit_with_backoff(medium, frame).await {
                TransmitOutcome::Sent => {
                    self.consecutive_failures = 0;
                    self.stats.sent += 1;
                    return true;
                }
                TransmitOutcome::ChannelBusy => {
                    self.stats.failed_attempts += 1;
                    self.stats.channel_busy += 1;
                }
                TransmitOutcome::Failed => {
                    self.stats.failed_attempts += 1;
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= self.config.hard_failure_threshold {
                        warn!("{} consecutive transmit failures, resetting radio", self.consecutive_failures);
                        if !medium.reset_radio() {
                            warn!("radio did not come back after reset");
                        }
                        self.stats.radio_resets += 1;
                        self.consecutive_failures = 0;
                    }
                }
            }

            if attempt < attempts {
                debug!("relay transmit attempt {} failed, retrying in {:?}", attempt, backoff);
                sleep(backoff).await;
                backoff = (backoff * 2).min(self.max_backoff);
            }
        }

        self.stats.abandoned += 1;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AccessConfig;
    use crate::radio::ChannelActivity;
    use tokio::time::Instant;

    #[derive(Default)]
    struct FlakyMedium {
        failures_left: u32,
        busy_scans_left: u32,
        transmits: u32,
        resets: u32,
    }

    impl Medium for FlakyMedium {
        fn scan_channel(&mut self) -> ChannelActivity {
            if self.busy_scans_left > 0 {
                self.busy_scans_left -= 1;
                return ChannelActivity::Busy;
            }
            ChannelActivity::Free
        }

        fn channel_rssi(&mut self) -> f32 {
            -120.0
        }

        fn transmit_frame(&mut self, _frame: &[u8]) -> bool {
            self.transmits += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return false;
            }
            true
        }

        fn reset_radio(&mut self) -> bool {
            self.resets += 1;
            true
        }
    }

    fn config(max_retries: u32, threshold: u32) -> RelayConfig {
        RelayConfig {
            max_retries,
            initial_backoff: Duration::from_millis(50),
            hard_failure_threshold: threshold,
            ..RelayConfig::default()
        }
    }

    fn access() -> ChannelAccessController {
        let config = AccessConfig {
            max_attempts: 2,
            ..AccessConfig::default()
        };
        ChannelAccessController::with_seed(config, 3)
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_budget() {
        let mut access = access();
        let mut retry = RadioRetry::new(config(3, 10), Duration::from_millis(1000));
        let mut medium = FlakyMedium { failures_left: 2, ..Default::default() };

        let start = Instant::now();
        assert!(retry.transmit_with_retry(&mut access, &mut medium, b"frame").await);
        // 50ms then 100ms between the three attempts
        assert_eq!(start.elapsed(), Duration::from_millis(150));
        assert_eq!(medium.transmits, 3);
        assert_eq!(retry.consecutive_failures(), 0);
        assert_eq!(retry.stats().failed_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_capped() {
        let mut access = access();
        let mut retry = RadioRetry::new(config(4, 100), Duration::from_millis(80));
        let mut medium = FlakyMedium { failures_left: 10, ..Default::default() };

        let start = Instant::now();
        assert!(!retry.transmit_with_retry(&mut access, &mut medium, b"frame").await);
        assert_eq!(start.elapsed(), Duration::from_millis(50 + 80 + 80));
        assert_eq!(retry.stats().abandoned, 1);
        assert_eq!(retry.consecutive_failures(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_reset_after_consecutive_failures() {
        let mut access = access();
        let mut retry = RadioRetry::new(config(3, 5), Duration::from_millis(1000));
        let mut medium = FlakyMedium { failures_left: 100, ..Default::default() };

        assert!(!retry.transmit_with_retry(&mut access, &mut medium, b"a").await);
        assert_eq!(medium.resets, 0);
        assert!(!retry.transmit_with_retry(&mut access, &mut medium, b"b").await);
        assert_eq!(medium.resets, 1);
        assert_eq!(retry.consecutive_failures(), 1);
        assert_eq!(retry.stats().radio_resets, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears_failure_streak() {
        let mut access = access();
        let mut retry = RadioRetry::new(config(1, 3), Duration::from_millis(1000));
        let mut medium = FlakyMedium { failures_left: 2, ..Default::default() };

        assert!(!retry.transmit_with_retry(&mut access, &mut medium, b"a").await);
        assert!(!retry.transmit_with_retry(&mut access, &mut medium, b"b").await);
        assert!(retry.transmit_with_retry(&mut access, &mut medium, b"c").await);
        assert_eq!(retry.consecutive_failures(), 0);
        assert_eq!(medium.resets, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_channel_holds_transmit() {
        let mut retry = RadioRetry::new(config(2, 1), Duration::from_millis(1000));
        let mut access = access();
        let mut medium = FlakyMedium { busy_scans_left: 4, ..Default::default() };

        assert!(!retry.transmit_with_retry(&mut access, &mut medium, b"frame").await);
        assert_eq!(medium.transmits, 0);
        assert_eq!(medium.resets, 0);
        assert_eq!(retry.consecutive_failures(), 0);
        let stats = retry.stats();
        assert_eq!(stats.channel_busy, 2);
        assert_eq!(stats.abandoned, 1);

        assert!(retry.transmit_with_retry(&mut access, &mut medium, b"frame").await);
        assert_eq!(medium.transmits, 1);
    }
}
