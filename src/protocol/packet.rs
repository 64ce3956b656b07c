use bytes::{BufMut, Bytes, BytesMut};

use crate::core::{
    Error, NodeId, Result, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, PACKET_HEADER_LEN, PACKET_MARKER,
    RELAY_REQUEST_FLAG,
};

/// Over-the-air packet: `marker | src | dest | len | payload`
///
/// The radio appends and checks its own CRC, so a packet reaching this layer
/// is assumed intact at the bit level; `decode` only checks structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sender asks relays to forward this packet
    pub relay_request: bool,
    pub src: NodeId,
    pub dest: NodeId,
    pub payload: Bytes,
}

impl Packet {
    /// Creates a packet, rejecting oversized payloads
    pub fn new(src: NodeId, dest: NodeId, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Packet {
            relay_request: false,
            src,
            dest,
            payload,
        })
    }

    /// Sets the relay-request flag
    pub fn with_relay_request(mut self, relay_request: bool) -> Self {
        self.relay_request = relay_request;
        self
    }

    /// Marker byte including the relay-request flag
    pub fn marker(&self) -> u8 {
        if self.relay_request {
            PACKET_MARKER | RELAY_REQUEST_FLAG
        } else {
            PACKET_MARKER
        }
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        PACKET_HEADER_LEN + self.payload.len()
    }

    /// Appends the wire form to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.marker());
        dst.put_u8(self.src.0);
        dst.put_u8(self.dest.0);
        dst.put_u8(self.payload.len() as u8);
        dst.extend_from_slice(&self.payload);
    }

    /// Returns the wire form
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Parses a received packet
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < PACKET_HEADER_LEN {
            return Err(Error::frame(format!("packet of {} bytes is shorter than its header", raw.len())));
        }
        if raw.len() > MAX_PACKET_SIZE {
            return Err(Error::frame(format!("packet of {} bytes exceeds {}", raw.len(), MAX_PACKET_SIZE)));
        }
        if raw[0] & !RELAY_REQUEST_FLAG != PACKET_MARKER {
            return Err(Error::frame(format!("bad marker {:#04x}", raw[0])));
        }

        let len = raw[3] as usize;
        if len > MAX_PAYLOAD_SIZE || PACKET_HEADER_LEN + len != raw.len() {
            return Err(Error::frame(format!(
                "declared length {} does not match {} received payload bytes",
                len,
                raw.len() - PACKET_HEADER_LEN
            )));
        }

        Ok(Packet {
            relay_request: raw[0] & RELAY_REQUEST_FLAG != 0,
            src: NodeId(raw[1]),
            dest: NodeId(raw[2]),
            payload: Bytes::copy_from_slice(&raw[PACKET_HEADER_LEN..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let packet = Packet::new(NodeId::GROUND, NodeId::TARGET, vec![0xDE, 0xAD])
            .unwrap()
            .with_relay_request(true);

        let wire = packet.to_bytes();
        assert_eq!(&wire[..], &[PACKET_MARKER | RELAY_REQUEST_FLAG, 0, 1, 2, 0xDE, 0xAD]);

        let decoded = Packet::decode(&wire).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_empty_payload() {
        let packet = Packet::new(NodeId::RELAY_A, NodeId::BROADCAST, Bytes::new()).unwrap();
        let decoded = Packet::decode(&packet.to_bytes()).unwrap();
        assert!(decoded.payload.is_empty());
        assert!(!decoded.relay_request);
        assert!(decoded.dest.is_broadcast());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let err = Packet::new(NodeId::GROUND, NodeId::TARGET, vec![0u8; MAX_PAYLOAD_SIZE + 1]).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { len: 251, max: 250 }));
    }

    #[test]
    fn test_structural_checks() {
        assert!(Packet::decode(&[PACKET_MARKER, 0, 1]).is_err());
        assert!(Packet::decode(&[0x00, 0, 1, 0]).is_err());
        // Declared length longer than what arrived
        assert!(Packet::decode(&[PACKET_MARKER, 0, 1, 5, 1, 2]).is_err());
        // Trailing garbage
        assert!(Packet::decode(&[PACKET_MARKER, 0, 1, 1, 1, 2]).is_err());
    }
}
