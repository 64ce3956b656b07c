//! Protocol implementation module
//!
//! This module defines the over-the-air packet, the view of the encapsulated
//! application header that the transport needs, and message classification.

pub mod classifier;
pub mod message;
pub mod packet;

pub use self::classifier::{classify, Classification, Classifier};
pub use self::message::MessageHeader;
pub use self::packet::Packet;

/// Classifies an encapsulated payload by its header, if it has one
pub fn classify_payload(payload: &[u8]) -> Classification {
    MessageHeader::message_id(payload)
        .map(classify)
        .unwrap_or(Classification::UNKNOWN)
}
