use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{TransportConfig, UdpConfig};
use crate::error::{Result, TransportError};
use crate::radio::RadioTransport;
use crate::traits::Transport;
use crate::udp::UdpTransport;

/// A transport chosen at startup.
pub struct Selected {
    pub transport: Arc<dyn Transport>,
    /// True when the primary was unavailable and the UDP fallback was opened.
    pub fell_back: bool,
}

impl std::fmt::Debug for Selected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selected")
            .field("transport", &self.transport.transport_name())
            .field("fell_back", &self.fell_back)
            .finish()
    }
}

/// Open the configured transport.
pub fn open(config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    match config {
        TransportConfig::Radio(radio) => Ok(Arc::new(RadioTransport::open(radio)?)),
        TransportConfig::Simulated(udp) => Ok(Arc::new(UdpTransport::open(udp)?)),
    }
}

/// Open `primary`, falling back to UDP only when a fallback is configured.
///
/// Only `TransportError::Unavailable` triggers the fallback; any other
/// error is returned as-is.
pub fn select_transport(
    primary: &TransportConfig,
    fallback: Option<&UdpConfig>,
) -> Result<Selected> {
    match open(primary) {
        Ok(transport) => Ok(Selected {
            transport,
            fell_back: false,
        }),
        Err(err @ TransportError::Unavailable { .. }) => match fallback {
            Some(udp) => {
                warn!(
                    primary = primary.name(),
                    target = %primary.target(),
                    error = %err,
                    "primary transport unavailable; opening simulated fallback"
                );
                let transport = UdpTransport::open(udp)?;
                Ok(Selected {
                    transport: Arc::new(transport),
                    fell_back: true,
                })
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

/// Result of a transport capability probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub transport: &'static str,
    pub target: String,
    pub available: bool,
    pub detail: String,
}

/// Check whether `config` could be opened right now.
///
/// The handle is opened and immediately released.
pub fn probe(config: &TransportConfig) -> ProbeReport {
    let (available, detail) = match open(config) {
        Ok(transport) => {
            transport.close();
            (true, "ok".to_string())
        }
        Err(err) => (false, err.to_string()),
    };
    info!(
        transport = config.name(),
        target = %config.target(),
        available,
        "transport probe"
    );
    ProbeReport {
        transport: config.name(),
        target: config.target(),
        available,
        detail,
    }
}

/// Serial devices the OS reports. Empty if enumeration is unsupported.
pub fn list_serial_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|port| port.port_name).collect(),
        Err(err) => {
            debug!(error = %err, "serial port enumeration unavailable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;

    use super::*;
    use crate::config::RadioConfig;

    fn missing_radio() -> TransportConfig {
        TransportConfig::Radio(RadioConfig {
            port: "/dev/roverlink-missing-radio".to_string(),
            ..RadioConfig::default()
        })
    }

    fn free_udp() -> UdpConfig {
        UdpConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            remote: "127.0.0.1:9".parse().unwrap(),
            ..UdpConfig::default()
        }
    }

    #[test]
    fn missing_radio_without_fallback_is_fatal() {
        let err = select_transport(&missing_radio(), None).unwrap_err();
        assert!(matches!(err, TransportError::Unavailable { .. }));
    }

    #[test]
    fn missing_radio_with_fallback_opens_udp() {
        let fallback = free_udp();
        let selected = select_transport(&missing_radio(), Some(&fallback)).unwrap();
        assert!(selected.fell_back);
        assert_eq!(selected.transport.transport_name(), "udp");
    }

    #[test]
    fn primary_udp_is_used_directly() {
        let selected =
            select_transport(&TransportConfig::Simulated(free_udp()), Some(&free_udp())).unwrap();
        assert!(!selected.fell_back);
    }

    #[test]
    fn probe_reports_busy_udp_port() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = TransportConfig::Simulated(UdpConfig {
            bind: taken.local_addr().unwrap(),
            ..free_udp()
        });

        let report = probe(&config);
        assert!(!report.available);
        assert_eq!(report.transport, "udp");

        let report = probe(&TransportConfig::Simulated(free_udp()));
        assert!(report.available);
    }
}
