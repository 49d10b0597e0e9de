/// Errors that can occur in link transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device or socket could not be opened (missing device, port busy,
    /// address already bound).
    #[error("{transport} unavailable at {target}: {source}")]
    Unavailable {
        transport: &'static str,
        target: String,
        source: std::io::Error,
    },

    /// No data arrived within the receive timeout.
    #[error("receive timed out")]
    Timeout,

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,

    /// An I/O error occurred on an open transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial driver reported an error on an open device.
    #[error("serial device error: {0}")]
    Serial(String),
}

impl TransportError {
    /// Whether this error should end the receive loop.
    ///
    /// `Timeout` is a polling signal, everything else is terminal for the
    /// current handle. `Closed` is terminal but not a failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Timeout)
    }

    pub(crate) fn unavailable(
        transport: &'static str,
        target: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        TransportError::Unavailable {
            transport,
            target: target.into(),
            source,
        }
    }
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::Io(kind) => {
                TransportError::Io(std::io::Error::new(kind, err.description))
            }
            _ => TransportError::Serial(err.description),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
