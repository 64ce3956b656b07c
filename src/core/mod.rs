//! Core types and traits for the skyrelay transport
//!
//! This module contains the fundamental building blocks used throughout the library:
//! node addressing, tiers, wire constants and configuration.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    AccessConfig,
    LinkConfig,
    NodeId,
    RelayConfig,
    Tier,
    WatchdogConfig,
};

/// Maximum payload carried by one over-the-air packet or relay frame
pub const MAX_PAYLOAD_SIZE: usize = 250;

/// Over-the-air header: marker, source, destination, length
pub const PACKET_HEADER_LEN: usize = 4;

/// Largest over-the-air packet
pub const MAX_PACKET_SIZE: usize = PACKET_HEADER_LEN + MAX_PAYLOAD_SIZE;

/// Marker byte opening every over-the-air packet
pub const PACKET_MARKER: u8 = 0x5A;

/// Bit OR'd into the marker when the sender asks relays to forward the packet
pub const RELAY_REQUEST_FLAG: u8 = 0x80;

/// Marker byte opening every relay bridge frame
pub const RELAY_FRAME_MARKER: u8 = 0x7E;

/// Relay bridge frame header: marker, source, destination, length
pub const RELAY_HEADER_LEN: usize = 4;

/// Trailing Fletcher-16 checksum
pub const RELAY_CHECKSUM_LEN: usize = 2;

/// Capacity of the relay bridge receive buffer
pub const RELAY_BUFFER_CAPACITY: usize = RELAY_HEADER_LEN + MAX_PAYLOAD_SIZE + RELAY_CHECKSUM_LEN;
