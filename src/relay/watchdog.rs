use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::core::WatchdogConfig;

/// Freshness check on one activity source.
///
/// Observes only: crossing into timeout and coming back are each logged
/// once, and nothing else changes.
#[derive(Debug, Clone)]
pub struct Watchdog {
    name: &'static str,
    timeout: Duration,
    last_activity: Instant,
    timed_out: bool,
    trips: u64,
}

impl Watchdog {
    pub fn new(name: &'static str, timeout: Duration, now: Instant) -> Self {
        Watchdog {
            name,
            timeout,
            last_activity: now,
            timed_out: false,
            trips: 0,
        }
    }

    /// Records activity, re-arming the timeout alert
    pub fn feed(&mut self, now: Instant) {
        self.last_activity = now;
        if self.timed_out {
            self.timed_out = false;
            info!("{} watchdog recovered", self.name);
        }
    }

    /// Returns whether the source is healthy at `now`
    pub fn check(&mut self, now: Instant) -> bool {
        let idle = now.saturating_duration_since(self.last_activity);
        if idle <= self.timeout {
            return true;
        }
        if !self.timed_out {
            self.timed_out = true;
            self.trips += 1;
            warn!("{} watchdog timed out after {:?} without activity", self.name, idle);
        }
        false
    }

    pub fn is_healthy(&self) -> bool {
        !self.timed_out
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Transitions into timeout so far
    pub fn trips(&self) -> u64 {
        self.trips
    }
}

/// Health of the three watched sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogHealth {
    pub link: bool,
    pub relay: bool,
    pub peer: bool,
}

/// Link activity, relay activity and peer liveness watchdogs
#[derive(Debug, Clone)]
pub struct WatchdogSet {
    pub link: Watchdog,
    pub relay: Watchdog,
    pub peer: Watchdog,
}

impl WatchdogSet {
    pub fn new(config: &WatchdogConfig, now: Instant) -> Self {
        WatchdogSet {
            link: Watchdog::new("link", config.link_timeout, now),
            relay: Watchdog::new("relay", config.relay_timeout, now),
            peer: Watchdog::new("peer", config.peer_timeout, now),
        }
    }

    pub fn check_all(&mut self, now: Instant) -> WatchdogHealth {
        WatchdogHealth {
            link: self.link.check(now),
            relay: self.relay.check(now),
            peer: self.peer.check(now),
        }
    }

    pub fn health(&self) -> WatchdogHealth {
        WatchdogHealth {
            link: self.link.is_healthy(),
            relay: self.relay.is_healthy(),
            peer: self.peer.is_healthy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_edge_triggered() {
        let start = Instant::now();
        let mut dog = Watchdog::new("peer", Duration::from_secs(3), start);

        assert!(dog.check(start + Duration::from_secs(3)));
        assert!(!dog.check(start + Duration::from_secs(4)));
        assert!(!dog.check(start + Duration::from_secs(5)));
        assert_eq!(dog.trips(), 1);
        assert!(!dog.is_healthy());

        dog.feed(start + Duration::from_secs(6));
        assert!(dog.is_healthy());
        assert!(dog.check(start + Duration::from_secs(7)));

        assert!(!dog.check(start + Duration::from_secs(10)));
        assert_eq!(dog.trips(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_uses_config_timeouts() {
        let start = Instant::now();
        let mut set = WatchdogSet::new(&WatchdogConfig::default(), start);

        let health = set.check_all(start + Duration::from_secs(4));
        assert_eq!(health, WatchdogHealth { link: true, relay: true, peer: false });
        assert_eq!(set.health(), health);

        set.peer.feed(start + Duration::from_secs(4));
        let health = set.check_all(start + Duration::from_secs(6));
        assert_eq!(health, WatchdogHealth { link: false, relay: true, peer: true });
    }
}
