//! Relay bridge module
//!
//! A two-hop relay is two radios on different frequencies joined by a UART.
//! This module frames traffic across that UART with a Fletcher-16 checked,
//! resynchronising codec, retries transmissions on the radio side, and watches
//! link, relay and peer activity.

pub mod bridge;
pub mod codec;
pub mod frame;
pub mod hop;
pub mod retry;
pub mod uart;
pub mod watchdog;

pub use self::bridge::{framed_reader, framed_writer, RelayBridge};
pub use self::codec::{BridgeStats, ParseState, RelayCodec};
pub use self::frame::{fletcher16, Fletcher16, RelayFrame};
pub use self::hop::{HopStats, RelayHop};
pub use self::retry::{RadioRetry, RetryStats};
pub use self::uart::{PipeUart, SerialUart, Uart};
pub use self::watchdog::{Watchdog, WatchdogHealth, WatchdogSet};
