//! Utility module
//!
//! Logging bootstrap and duration helpers used throughout the library.

use std::time::Duration;

use tracing::Level;

use crate::core::{Error, Result};

/// Installs a formatted `tracing` subscriber filtering at `level`.
///
/// Fails if the process already has a global subscriber.
pub fn init_tracing(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts whole milliseconds to a duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_conversion() {
        let duration = Duration::from_millis(1500);
        let millis = duration_to_millis(duration);
        assert_eq!(millis, 1500);
        assert_eq!(millis_to_duration(millis), duration);

        assert_eq!(duration_to_millis(Duration::from_micros(2999)), 2);
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_init_tracing_only_once() {
        let first = init_tracing(Level::DEBUG);
        // Another test binary may already have installed one
        if first.is_ok() {
            assert!(init_tracing(Level::INFO).is_err());
        }
    }
}
