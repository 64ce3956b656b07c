use std::io;
use thiserror::Error;

use super::types::Tier;

/// Custom error types for skyrelay
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Radio error: {0}")]
    Radio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Queue for tier {tier} is full")]
    QueueFull { tier: Tier },

    #[error("Message id {0} is blacklisted")]
    Blacklisted(u32),

    #[error("Message id {0} is rate limited")]
    RateLimited(u32),

    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new radio error
    pub fn radio(msg: impl Into<String>) -> Self {
        Error::Radio(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new frame error
    pub fn frame(msg: impl Into<String>) -> Self {
        Error::Frame(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::radio("spi timeout");
        assert!(matches!(err, Error::Radio(_)));
        assert_eq!(err.to_string(), "Radio error: spi timeout");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_queue_full_display() {
        let err = Error::QueueFull { tier: Tier::IMPORTANT };
        assert_eq!(err.to_string(), "Queue for tier 1 is full");
    }
}
