use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

/// Serial radio settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Device path (`/dev/ttyUSB0`, `COM4`).
    pub port: String,
    /// Line rate in baud.
    pub baud: u32,
    /// Maximum bytes returned by a single receive.
    pub max_read: usize,
}

impl RadioConfig {
    pub const DEFAULT_PORT: &'static str = "/dev/ttyUSB0";
    pub const DEFAULT_BAUD: u32 = 230_400;
    pub const DEFAULT_MAX_READ: usize = 256;
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT.to_string(),
            baud: Self::DEFAULT_BAUD,
            max_read: Self::DEFAULT_MAX_READ,
        }
    }
}

/// UDP simulation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Local address frames are received on.
    pub bind: SocketAddr,
    /// Peer address frames are sent to.
    pub remote: SocketAddr,
    /// Receive buffer size; datagrams longer than this are truncated by the OS.
    pub max_datagram: usize,
}

impl UdpConfig {
    /// Basestation receive port.
    pub const DEFAULT_LOCAL_PORT: u16 = 5002;
    /// Rover command port.
    pub const DEFAULT_REMOTE_PORT: u16 = 5001;
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                Self::DEFAULT_LOCAL_PORT,
            )),
            remote: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                Self::DEFAULT_REMOTE_PORT,
            )),
            max_datagram: crate::udp::UdpTransport::DEFAULT_MAX_DATAGRAM,
        }
    }
}

/// Which transport to open at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Radio(RadioConfig),
    Simulated(UdpConfig),
}

impl TransportConfig {
    /// Short name of the selected transport.
    pub fn name(&self) -> &'static str {
        match self {
            TransportConfig::Radio(_) => "radio",
            TransportConfig::Simulated(_) => "udp",
        }
    }

    /// Human-readable target (device path or bind address).
    pub fn target(&self) -> String {
        match self {
            TransportConfig::Radio(radio) => format!("{}@{}", radio.port, radio.baud),
            TransportConfig::Simulated(udp) => format!("{} -> {}", udp.bind, udp.remote),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Simulated(UdpConfig::default())
    }
}
