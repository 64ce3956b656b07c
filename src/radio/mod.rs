//! Radio access module
//!
//! This module wraps a half-duplex radio driver: framing and address filtering
//! of received packets, the single-slot mailboxes that hand packets from the
//! driver's receive callback to the main loop, and listen-before-talk channel
//! access with randomised exponential backoff.

pub mod access;
pub mod mailbox;
pub mod sim;
pub mod transceiver;

pub use self::access::{AccessStats, ChannelAccessController, TransmitOutcome};
pub use self::mailbox::Mailbox;
pub use self::sim::SimulatedRadio;
pub use self::transceiver::{InboundPacket, PacketTransceiver, RxHandle, TransceiverStats};

use crate::core::Result;

/// Outcome of a hardware channel-activity scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelActivity {
    /// No preamble detected
    Free,
    /// A transmission is in progress
    Busy,
    /// The scan could not be completed
    Error,
}

/// Driver for one radio.
///
/// Calls are short register operations; the only asynchronous path is the
/// receive callback, which the driver invokes through the [`RxHandle`] it is
/// given at registration.
pub trait RadioDriver: Send {
    /// Transmits one raw packet and waits for completion
    fn transmit(&mut self, frame: &[u8]) -> Result<()>;

    /// Enters continuous receive mode
    fn start_receive(&mut self) -> Result<()>;

    /// Leaves receive mode
    fn standby(&mut self) -> Result<()>;

    /// Runs channel-activity detection
    fn scan_channel_activity(&mut self) -> ChannelActivity;

    /// Instantaneous received signal strength in dBm
    fn rssi_dbm(&mut self) -> f32;

    /// Signal-to-noise ratio of the last packet in dB
    fn snr_db(&mut self) -> f32;

    /// Registers the handler that receives every completed packet
    fn set_receive_handler(&mut self, handler: RxHandle);

    /// Hard-resets and reinitialises the radio
    fn reset(&mut self) -> Result<()>;
}

/// The shared medium as seen by channel access and retry logic
pub trait Medium {
    /// Hardware channel-activity detection
    fn scan_channel(&mut self) -> ChannelActivity;

    /// Instantaneous energy on the channel in dBm
    fn channel_rssi(&mut self) -> f32;

    /// Transmits a frame, returning whether the radio accepted it
    fn transmit_frame(&mut self, frame: &[u8]) -> bool;

    /// Hard-resets the radio, returning whether it came back
    fn reset_radio(&mut self) -> bool;
}
