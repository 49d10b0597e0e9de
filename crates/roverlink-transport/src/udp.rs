use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::config::UdpConfig;
use crate::error::{Result, TransportError};
use crate::traits::{Framing, Transport};

/// UDP simulation transport.
///
/// Receives on a bound local socket and sends every frame as one datagram
/// to a fixed remote address, so message boundaries are preserved end to end.
pub struct UdpTransport {
    socket: UdpSocket,
    local: SocketAddr,
    remote: SocketAddr,
    max_datagram: usize,
    /// Receive buffer, sized on first use and kept across polls.
    recv_buf: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("max_datagram", &self.max_datagram)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl UdpTransport {
    /// Default receive buffer, large enough for a maximum extended frame.
    pub const DEFAULT_MAX_DATAGRAM: usize = 65_535 + 15;

    /// Bind the local receive address and target the configured remote.
    pub fn open(config: &UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind)
            .map_err(|e| TransportError::unavailable("udp", config.bind.to_string(), e))?;
        let transport = Self::from_socket(socket, config.remote)?;
        Ok(transport.with_max_datagram(config.max_datagram))
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: UdpSocket, remote: SocketAddr) -> Result<Self> {
        socket.set_nonblocking(false)?;
        let local = socket.local_addr()?;
        info!(%local, %remote, "udp transport bound");
        Ok(Self {
            socket,
            local,
            remote,
            max_datagram: Self::DEFAULT_MAX_DATAGRAM,
            recv_buf: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Override the receive buffer size.
    pub fn with_max_datagram(mut self, max_datagram: usize) -> Self {
        self.max_datagram = max_datagram.max(1);
        self
    }

    /// Address this transport receives on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Address frames are sent to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Wake a receiver blocked in `recv_from` by sending it an empty datagram.
    fn wake_receiver(&self) {
        let mut target = self.local;
        if target.ip().is_unspecified() {
            target.set_ip(Ipv4Addr::LOCALHOST.into());
        }
        let _ = self.socket.send_to(&[], target);
    }
}

impl Transport for UdpTransport {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let sent = self.socket.send_to(bytes, self.remote)?;
        if sent != bytes.len() {
            return Err(TransportError::Io(std::io::Error::new(
                ErrorKind::WriteZero,
                format!("datagram truncated: sent {sent} of {} bytes", bytes.len()),
            )));
        }
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Bytes> {
        // A zero timeout would mean "block forever" to the socket layer.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;

        let mut buf = self.recv_buf.lock().unwrap_or_else(PoisonError::into_inner);
        buf.resize(self.max_datagram, 0);
        loop {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            match self.socket.recv_from(&mut buf[..]) {
                Ok((0, _)) => {
                    // Empty datagrams carry no frame; they are only used as a
                    // close wakeup.
                    if self.is_closed() {
                        return Err(TransportError::Closed);
                    }
                    return Err(TransportError::Timeout);
                }
                Ok((n, from)) => {
                    debug!(%from, len = n, "udp datagram received");
                    return Ok(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    if self.is_closed() {
                        return Err(TransportError::Closed);
                    }
                    return Err(TransportError::Timeout);
                }
                Err(err) if self.is_closed() => {
                    debug!(error = %err, "receive error after close");
                    return Err(TransportError::Closed);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(local = %self.local, "closing udp transport");
            self.wake_receiver();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn framing(&self) -> Framing {
        Framing::Datagram
    }

    fn transport_name(&self) -> &'static str {
        "udp"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn loopback_pair() -> (UdpTransport, UdpTransport) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        (
            UdpTransport::from_socket(a, b_addr).unwrap(),
            UdpTransport::from_socket(b, a_addr).unwrap(),
        )
    }

    #[test]
    fn one_send_is_one_receive() {
        let (left, right) = loopback_pair();

        left.send(b"first").unwrap();
        left.send(b"second").unwrap();

        let one = right.receive(Duration::from_secs(1)).unwrap();
        let two = right.receive(Duration::from_secs(1)).unwrap();
        assert_eq!(one.as_ref(), b"first");
        assert_eq!(two.as_ref(), b"second");
    }

    #[test]
    fn receive_times_out_without_data() {
        let (_left, right) = loopback_pair();
        let err = right.receive(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        assert!(!err.is_fatal());
    }

    #[test]
    fn close_unblocks_receiver() {
        let (_left, right) = loopback_pair();
        let right = Arc::new(right);

        let receiver = {
            let right = Arc::clone(&right);
            thread::spawn(move || right.receive(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(50));
        right.close();

        let result = receiver.join().unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(matches!(right.send(b"late"), Err(TransportError::Closed)));
    }

    #[test]
    fn open_reports_address_in_use() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = UdpConfig {
            bind: taken.local_addr().unwrap(),
            remote: "127.0.0.1:9".parse().unwrap(),
            max_datagram: 64,
        };

        let err = UdpTransport::open(&config).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unavailable {
                transport: "udp",
                ..
            }
        ));
    }

    #[test]
    fn shorter_datagram_after_longer_is_not_padded() {
        let (left, right) = loopback_pair();

        left.send(&[0x11; 300]).unwrap();
        left.send(&[0x22; 3]).unwrap();
        left.send(&[0x33; 40]).unwrap();

        let first = right.receive(Duration::from_secs(1)).unwrap();
        let second = right.receive(Duration::from_secs(1)).unwrap();
        let third = right.receive(Duration::from_secs(1)).unwrap();
        assert_eq!(first.as_ref(), &[0x11; 300][..]);
        assert_eq!(second.as_ref(), &[0x22; 3][..]);
        assert_eq!(third.as_ref(), &[0x33; 40][..]);
        assert_eq!(
            right.recv_buf.lock().unwrap().len(),
            UdpTransport::DEFAULT_MAX_DATAGRAM
        );
    }

    #[test]
    fn large_datagram_is_not_split() {
        let (left, right) = loopback_pair();
        let payload = vec![0x5A; 8 * 1024];

        left.send(&payload).unwrap();
        let got = right.receive(Duration::from_secs(1)).unwrap();
        assert_eq!(got.len(), payload.len());
    }
}
