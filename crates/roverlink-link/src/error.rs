/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] roverlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] roverlink_frame::FrameError),

    /// The configuration snapshot is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for a link config.
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },

    /// `start` was called on a manager whose workers are already running.
    #[error("link is already running")]
    AlreadyRunning,

    /// The manager has been shut down.
    #[error("link has been shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, LinkError>;
