use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::core::{
    Error, NodeId, MAX_PAYLOAD_SIZE, RELAY_BUFFER_CAPACITY, RELAY_CHECKSUM_LEN, RELAY_FRAME_MARKER,
    RELAY_HEADER_LEN,
};
use super::frame::{fletcher16, RelayFrame};

/// Parser position within the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Discarding bytes until a marker
    WaitMarker,
    /// Marker seen, collecting src, dest and length
    AccumulateHeader,
    /// Collecting payload and checksum up to the given frame size
    AccumulatePayload { frame_len: usize },
}

/// Counters of the relay bridge byte stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub checksum_errors: u64,
    pub overflow_errors: u64,
    /// Partial frames abandoned after the inactivity timeout
    pub inactivity_resets: u64,
    /// Bytes skipped while hunting for a marker
    pub bytes_discarded: u64,
    pub io_errors: u64,
}

/// Resynchronising decoder and encoder for relay frames.
///
/// Any fault returns the parser to [`ParseState::WaitMarker`]; none of them
/// surface as decode errors.
#[derive(Debug)]
pub struct RelayCodec {
    state: ParseState,
    buf: BytesMut,
    inactivity_timeout: Duration,
    last_byte_at: Option<Instant>,
    stats: BridgeStats,
}

impl RelayCodec {
    pub fn new(inactivity_timeout: Duration) -> Self {
        RelayCodec {
            state: ParseState::WaitMarker,
            buf: BytesMut::with_capacity(RELAY_BUFFER_CAPACITY),
            inactivity_timeout,
            last_byte_at: None,
            stats: BridgeStats::default(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Bytes of the frame accumulated so far
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Abandons a partial frame left untouched past the inactivity timeout.
    ///
    /// Returns whether a reset happened.
    pub fn expire_if_idle(&mut self, now: Instant) -> bool {
        if self.state == ParseState::WaitMarker {
            return false;
        }
        let idle = match self.last_byte_at {
            Some(last) => now.saturating_duration_since(last) > self.inactivity_timeout,
            None => false,
        };
        if idle {
            debug!("relay parser idle with {} bytes buffered, resetting", self.buf.len());
            self.stats.inactivity_resets += 1;
            self.reset();
        }
        idle
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.state = ParseState::WaitMarker;
    }

    fn fill_to(&mut self, target: usize, src: &mut BytesMut) -> bool {
        let take = (target - self.buf.len()).min(src.len());
        self.buf.put_slice(&src[..take]);
        src.advance(take);
        self.buf.len() == target
    }

    fn finish_frame(&mut self) -> Option<RelayFrame> {
        let frame = self.buf.split().freeze();
        self.state = ParseState::WaitMarker;

        let body_end = frame.len() - RELAY_CHECKSUM_LEN;
        let expected = u16::from_be_bytes([frame[body_end], frame[body_end + 1]]);
        let actual = fletcher16(&frame[1..body_end]);
        if actual != expected {
            self.stats.checksum_errors += 1;
            debug!("relay frame checksum mismatch: got {:#06x}, expected {:#06x}", actual, expected);
            return None;
        }

        self.stats.frames_received += 1;
        Some(RelayFrame {
            src: NodeId(frame[1]),
            dest: NodeId(frame[2]),
            payload: frame.slice(RELAY_HEADER_LEN..body_end),
        })
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        RelayCodec::new(Duration::from_millis(500))
    }
}

impl Decoder for RelayCodec {
    type Item = RelayFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let now = Instant::now();
        self.expire_if_idle(now);

        while !src.is_empty() {
            self.last_byte_at = Some(now);

            match self.state {
                ParseState::WaitMarker => match src.iter().position(|&b| b == RELAY_FRAME_MARKER) {
                    Some(skip) => {
                        self.stats.bytes_discarded += skip as u64;
                        src.advance(skip + 1);
                        self.buf.clear();
                        self.buf.put_u8(RELAY_FRAME_MARKER);
                        self.state = ParseState::AccumulateHeader;
                    }
                    None => {
                        self.stats.bytes_discarded += src.len() as u64;
                        src.clear();
                    }
                },
                ParseState::AccumulateHeader => {
                    if !self.fill_to(RELAY_HEADER_LEN, src) {
                        return Ok(None);
                    }

                    let len = self.buf[RELAY_HEADER_LEN - 1] as usize;
                    let frame_len = RELAY_HEADER_LEN + len + RELAY_CHECKSUM_LEN;
                    if len > MAX_PAYLOAD_SIZE || frame_len > RELAY_BUFFER_CAPACITY {
                        self.stats.overflow_errors += 1;
                        debug!("relay frame declares {} payload bytes, flushing input", len);
                        self.reset();
                        src.clear();
                        return Ok(None);
                    }
                    self.state = ParseState::AccumulatePayload { frame_len };
                }
                ParseState::AccumulatePayload { frame_len } => {
                    if !self.fill_to(frame_len, src) {
                        return Ok(None);
                    }
                    if let Some(frame) = self.finish_frame() {
                        return Ok(Some(frame));
                    }
                }
            }
        }

        Ok(None)
    }
}

impl Encoder<RelayFrame> for RelayCodec {
    type Error = Error;

    fn encode(&mut self, item: RelayFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst)?;
        self.stats.frames_sent += 1;
        Ok(())
    }
}
