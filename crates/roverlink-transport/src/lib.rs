//! Byte-delivery transports for the rover control link.
//!
//! Provides one interface over two links:
//! - a serial-attached radio modem (raw byte stream)
//! - a UDP socket pair used for simulation (one frame per datagram)
//!
//! This is the lowest layer of roverlink. Framing and message semantics
//! live in `roverlink-frame`; everything here moves opaque bytes.

pub mod config;
pub mod error;
pub mod open;
pub mod radio;
pub mod traits;
pub mod udp;

pub use config::{RadioConfig, TransportConfig, UdpConfig};
pub use error::{Result, TransportError};
pub use open::{list_serial_ports, open, probe, select_transport, ProbeReport, Selected};
pub use radio::{RadioDevice, RadioTransport};
pub use traits::{Framing, Transport};
pub use udp::UdpTransport;
