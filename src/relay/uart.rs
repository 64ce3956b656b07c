use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serialport::SerialPort;

use crate::core::{Error, Result};

/// Byte stream to the peer hop
pub trait Uart: Send {
    /// Bytes that can be read without blocking
    fn available(&mut self) -> Result<usize>;

    /// Reads up to `buf.len()` bytes, returning how many were read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `bytes`
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Hardware UART through `serialport`
pub struct SerialUart {
    port: Box<dyn SerialPort>,
}

impl SerialUart {
    /// Opens the serial device linking the two hops
    pub fn open(device_path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(device_path, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| Error::config(format!("Failed to open relay UART {}: {}", device_path, e)))?;

        Ok(SerialUart { port })
    }
}

impl Uart for SerialUart {
    fn available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        Ok(())
    }
}

/// One end of an in-memory UART pair
#[derive(Debug, Clone)]
pub struct PipeUart {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<VecDeque<u8>>>,
}

impl PipeUart {
    /// Two ends wired back to back
    pub fn pair() -> (PipeUart, PipeUart) {
        let a = Arc::new(Mutex::new(VecDeque::new()));
        let b = Arc::new(Mutex::new(VecDeque::new()));
        (
            PipeUart { rx: Arc::clone(&a), tx: Arc::clone(&b) },
            PipeUart { rx: b, tx: a },
        )
    }

    fn lock(queue: &Mutex<VecDeque<u8>>) -> MutexGuard<'_, VecDeque<u8>> {
        queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bytes written by this end and not yet read by the other
    pub fn pending_out(&self) -> usize {
        Self::lock(&self.tx).len()
    }
}

impl Uart for PipeUart {
    fn available(&mut self) -> Result<usize> {
        Ok(Self::lock(&self.rx).len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut rx = Self::lock(&self.rx);
        let n = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        Self::lock(&self.tx).extend(bytes.iter().copied());
        Ok(())
    }
}
