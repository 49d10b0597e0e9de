use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// How a transport delimits messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One `send` is one `receive`. Messages are never coalesced or split.
    Datagram,
    /// Raw byte stream. A `receive` may return partial or multiple frames.
    Stream,
}

/// The byte-delivery capability shared by the radio and simulated links.
///
/// Implementations are safe to share between a sending thread and a
/// receiving thread: `send` and `receive` take `&self` and serialize
/// internally where the underlying device requires it.
pub trait Transport: Send + Sync {
    /// Write one outgoing frame. No additional framing is added.
    fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Block up to `timeout` for incoming bytes.
    ///
    /// Returns `TransportError::Timeout` if nothing arrived and
    /// `TransportError::Closed` once [`Transport::close`] has been called.
    fn receive(&self, timeout: Duration) -> Result<Bytes>;

    /// Release the handle. In-flight and later receives return `Closed`.
    fn close(&self);

    /// Whether [`Transport::close`] has been called.
    fn is_closed(&self) -> bool;

    /// Message delimiting provided by this transport.
    fn framing(&self) -> Framing;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}
