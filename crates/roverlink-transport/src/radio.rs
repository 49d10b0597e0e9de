use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serialport::SerialPort;
use tracing::{debug, info};

use crate::config::RadioConfig;
use crate::error::{Result, TransportError};
use crate::traits::{Framing, Transport};

/// Longest a blocked receive waits before re-checking for close.
const CLOSE_POLL: Duration = Duration::from_millis(50);

/// A serial-like byte device behind the radio transport.
///
/// Implemented for real serial ports; tests substitute in-memory devices.
pub trait RadioDevice: Read + Write + Send {
    /// Bound the next blocking read.
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

impl RadioDevice for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.set_timeout(timeout)
            .map_err(|err| std::io::Error::other(err.description))
    }
}

/// Radio transport over a serial-attached modem.
///
/// Bytes are written as-is; the peer must use fixed-size or
/// length-prefixed frames. Reads return whatever the device has buffered,
/// which may be a partial frame.
pub struct RadioTransport {
    reader: Mutex<Box<dyn RadioDevice>>,
    writer: Mutex<Box<dyn RadioDevice>>,
    port: String,
    max_read: usize,
    closed: AtomicBool,
}

impl RadioTransport {
    /// Open the configured serial port.
    pub fn open(config: &RadioConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud)
            .timeout(CLOSE_POLL)
            .open()
            .map_err(|err| {
                TransportError::unavailable("radio", config.port.clone(), serial_to_io(err))
            })?;
        let reader = port.try_clone().map_err(|err| {
            TransportError::unavailable("radio", config.port.clone(), serial_to_io(err))
        })?;

        info!(port = %config.port, baud = config.baud, "radio transport opened");

        Ok(Self::from_devices(Box::new(reader), Box::new(port), &config.port)
            .with_max_read(config.max_read))
    }

    /// Build a radio transport from separate read and write handles to one device.
    pub fn from_devices(
        reader: Box<dyn RadioDevice>,
        writer: Box<dyn RadioDevice>,
        port: &str,
    ) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            port: port.to_string(),
            max_read: RadioConfig::DEFAULT_MAX_READ,
            closed: AtomicBool::new(false),
        }
    }

    /// Override the per-read buffer size.
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }

    /// Device path or name this transport was opened on.
    pub fn port(&self) -> &str {
        &self.port
    }
}

fn serial_to_io(err: serialport::Error) -> std::io::Error {
    match err.kind {
        serialport::ErrorKind::Io(kind) => std::io::Error::new(kind, err.description),
        serialport::ErrorKind::NoDevice => {
            std::io::Error::new(ErrorKind::NotFound, err.description)
        }
        _ => std::io::Error::other(err.description),
    }
}

fn lock(device: &Mutex<Box<dyn RadioDevice>>) -> MutexGuard<'_, Box<dyn RadioDevice>> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for RadioTransport {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut writer = lock(&self.writer);
        writer.write_all(bytes)?;
        writer.flush()?;
        debug!(port = %self.port, len = bytes.len(), "radio bytes written");
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        let mut reader = lock(&self.reader);
        let mut buf = vec![0u8; self.max_read];

        loop {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout);
            }

            reader.set_read_timeout((deadline - now).min(CLOSE_POLL))?;
            match reader.read(&mut buf) {
                Ok(0) => return Err(TransportError::Timeout),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Bytes::from(buf));
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
                    ) =>
                {
                    continue;
                }
                Err(_) if self.is_closed() => return Err(TransportError::Closed),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(port = %self.port, "closing radio transport");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn framing(&self) -> Framing {
        Framing::Stream
    }

    fn transport_name(&self) -> &'static str {
        "radio"
    }
}

impl std::fmt::Debug for RadioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioTransport")
            .field("port", &self.port)
            .field("max_read", &self.max_read)
            .field("closed", &self.is_closed())
            .finish()
    }
}
