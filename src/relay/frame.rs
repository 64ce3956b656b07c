use bytes::{BufMut, Bytes, BytesMut};

use crate::core::{
    Error, NodeId, Result, MAX_PAYLOAD_SIZE, RELAY_CHECKSUM_LEN, RELAY_FRAME_MARKER, RELAY_HEADER_LEN,
};

/// Running Fletcher-16 accumulators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fletcher16 {
    sum1: u16,
    sum2: u16,
}

impl Fletcher16 {
    pub fn new() -> Self {
        Fletcher16::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.sum1 = (self.sum1 + byte as u16) % 255;
            self.sum2 = (self.sum2 + self.sum1) % 255;
        }
    }

    /// `(sum2 << 8) | sum1`
    pub fn value(&self) -> u16 {
        (self.sum2 << 8) | self.sum1
    }
}

/// Fletcher-16 of `bytes`
pub fn fletcher16(bytes: &[u8]) -> u16 {
    let mut checksum = Fletcher16::new();
    checksum.update(bytes);
    checksum.value()
}

/// A frame on the inter-radio bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    pub src: NodeId,
    pub dest: NodeId,
    pub payload: Bytes,
}

impl RelayFrame {
    pub fn new(src: NodeId, dest: NodeId, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(RelayFrame { src, dest, payload })
    }

    /// Empty frame from one hop to its peer, used as a liveness signal
    pub fn heartbeat(src: NodeId, dest: NodeId) -> Self {
        RelayFrame {
            src,
            dest,
            payload: Bytes::new(),
        }
    }

    /// Whether this is `peer`'s heartbeat to `hop`.
    ///
    /// Bridged traffic keeps its radio addresses, so an empty payload alone
    /// does not make a heartbeat.
    pub fn is_heartbeat(&self, peer: NodeId, hop: NodeId) -> bool {
        self.src == peer && self.dest == hop && self.payload.is_empty()
    }

    pub fn encoded_len(&self) -> usize {
        RELAY_HEADER_LEN + self.payload.len() + RELAY_CHECKSUM_LEN
    }

    /// Checksum over src, dest, length and payload
    pub fn checksum(&self) -> u16 {
        let mut checksum = Fletcher16::new();
        checksum.update(&[self.src.0, self.dest.0, self.payload.len() as u8]);
        checksum.update(&self.payload);
        checksum.value()
    }

    /// Appends the wire form to `dst`; the checksum goes out high byte first
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(self.encoded_len());
        dst.put_u8(RELAY_FRAME_MARKER);
        dst.put_u8(self.src.0);
        dst.put_u8(self.dest.0);
        dst.put_u8(self.payload.len() as u8);
        dst.put_slice(&self.payload);
        dst.put_u16(self.checksum());
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}
