use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::debug;

use crate::core::RELAY_BUFFER_CAPACITY;
use super::codec::{BridgeStats, ParseState, RelayCodec};
use super::frame::RelayFrame;
use super::uart::Uart;

/// Polled relay link over a byte-stream UART
pub struct RelayBridge<U: Uart> {
    uart: U,
    codec: RelayCodec,
    rx: BytesMut,
    tx: BytesMut,
    io_errors: u64,
}

impl<U: Uart> RelayBridge<U> {
    pub fn new(uart: U, inactivity_timeout: Duration) -> Self {
        RelayBridge {
            uart,
            codec: RelayCodec::new(inactivity_timeout),
            rx: BytesMut::with_capacity(RELAY_BUFFER_CAPACITY),
            tx: BytesMut::with_capacity(RELAY_BUFFER_CAPACITY),
            io_errors: 0,
        }
    }

    /// Returns the next complete frame, reading whatever the UART has buffered
    pub fn poll(&mut self) -> Option<RelayFrame> {
        self.codec.expire_if_idle(Instant::now());

        if let Some(frame) = self.decode_buffered() {
            return Some(frame);
        }

        let available = match self.uart.available() {
            Ok(n) => n,
            Err(e) => {
                self.io_errors += 1;
                debug!("relay uart unavailable: {}", e);
                return None;
            }
        };
        if available == 0 {
            return None;
        }

        let start = self.rx.len();
        self.rx.resize(start + available, 0);
        match self.uart.read(&mut self.rx[start..]) {
            Ok(n) => self.rx.truncate(start + n),
            Err(e) => {
                self.rx.truncate(start);
                self.io_errors += 1;
                debug!("relay uart read failed: {}", e);
                return None;
            }
        }

        self.decode_buffered()
    }

    fn decode_buffered(&mut self) -> Option<RelayFrame> {
        if self.rx.is_empty() {
            return None;
        }
        // Decoding never fails; faults only reset the parser
        self.codec.decode(&mut self.rx).ok().flatten()
    }

    /// Frames and writes one frame, returning whether the UART took it
    pub fn send(&mut self, frame: RelayFrame) -> bool {
        self.tx.clear();
        if let Err(e) = self.codec.encode(frame, &mut self.tx) {
            debug!("relay frame not encoded: {}", e);
            return false;
        }
        match self.uart.write(&self.tx) {
            Ok(()) => true,
            Err(e) => {
                self.io_errors += 1;
                debug!("relay uart write failed: {}", e);
                false
            }
        }
    }

    pub fn state(&self) -> ParseState {
        self.codec.state()
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            io_errors: self.io_errors,
            ..self.codec.stats().clone()
        }
    }
}

/// Stream of relay frames from an async byte source
pub fn framed_reader<T: AsyncRead>(io: T, inactivity_timeout: Duration) -> FramedRead<T, RelayCodec> {
    FramedRead::new(io, RelayCodec::new(inactivity_timeout))
}

/// Sink of relay frames into an async byte sink
pub fn framed_writer<T: AsyncWrite>(io: T) -> FramedWrite<T, RelayCodec> {
    FramedWrite::new(io, RelayCodec::default())
}
