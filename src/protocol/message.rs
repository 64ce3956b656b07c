//! Header fields of the encapsulated application protocol
//!
//! Only the handful of fields needed to classify and deduplicate are read:
//! system id, component id, sequence number and message id.

/// Start byte of a version 1 frame
pub const V1_START: u8 = 0xFE;

/// Start byte of a version 2 frame
pub const V2_START: u8 = 0xFD;

const V1_HEADER_LEN: usize = 6;
const V2_HEADER_LEN: usize = 10;

/// Fields extracted from the front of an encapsulated message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Originating system
    pub system_id: u8,
    /// Originating component
    pub component_id: u8,
    /// Per-sender sequence number, wraps at 256
    pub sequence: u8,
    /// Message id (24 bits on version 2)
    pub message_id: u32,
}

impl MessageHeader {
    /// Parses the header of a version 1 or version 2 frame
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes.first()? {
            &V1_START if bytes.len() >= V1_HEADER_LEN => Some(MessageHeader {
                sequence: bytes[2],
                system_id: bytes[3],
                component_id: bytes[4],
                message_id: bytes[5] as u32,
            }),
            &V2_START if bytes.len() >= V2_HEADER_LEN => Some(MessageHeader {
                sequence: bytes[4],
                system_id: bytes[5],
                component_id: bytes[6],
                message_id: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], 0]),
            }),
            _ => None,
        }
    }

    /// Extracts only the message id
    pub fn message_id(bytes: &[u8]) -> Option<u32> {
        Self::parse(bytes).map(|header| header.message_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a minimal version 2 frame carrying `payload`
    pub(crate) fn v2_frame(system_id: u8, sequence: u8, message_id: u32, payload: &[u8]) -> Vec<u8> {
        let id = message_id.to_le_bytes();
        let mut frame = vec![
            V2_START,
            payload.len() as u8,
            0,
            0,
            sequence,
            system_id,
            1,
            id[0],
            id[1],
            id[2],
        ];
        frame.extend_from_slice(payload);
        // Application CRC is opaque to the transport
        frame.extend_from_slice(&[0xAA, 0x55]);
        frame
    }

    #[test]
    fn test_parse_v1() {
        let frame = [V1_START, 9, 42, 7, 1, 76, 0, 0];
        let header = MessageHeader::parse(&frame).unwrap();
        assert_eq!(header.sequence, 42);
        assert_eq!(header.system_id, 7);
        assert_eq!(header.component_id, 1);
        assert_eq!(header.message_id, 76);
    }

    #[test]
    fn test_parse_v2_wide_message_id() {
        let frame = v2_frame(3, 200, 0x01_2345, &[1, 2, 3]);
        let header = MessageHeader::parse(&frame).unwrap();
        assert_eq!(header.system_id, 3);
        assert_eq!(header.sequence, 200);
        assert_eq!(header.message_id, 0x01_2345);
    }

    #[test]
    fn test_rejects_truncated_and_foreign_frames() {
        assert!(MessageHeader::parse(&[]).is_none());
        assert!(MessageHeader::parse(&[V2_START, 0, 0, 0]).is_none());
        assert!(MessageHeader::parse(&[V1_START, 1, 2]).is_none());
        assert!(MessageHeader::parse(&[0x42; 16]).is_none());
    }
}
