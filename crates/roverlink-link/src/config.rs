use std::path::Path;
use std::time::Duration;

use roverlink_frame::ProtocolVersion;
use roverlink_transport::{TransportConfig, UdpConfig};
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 250;
pub const DEFAULT_RECEIVE_POLL_MS: u64 = 100;
pub const DEFAULT_DEDUP_CAPACITY: usize = 256;
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 10_000;

/// Everything a link needs at startup. Read once; never changed while the
/// link runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub transport: TransportConfig,
    /// Opened when `transport` is unavailable. No fallback when absent.
    pub fallback: Option<UdpConfig>,
    pub protocol: ProtocolVersion,
    pub heartbeat: HeartbeatConfig,
    /// Upper bound on one blocking receive, so the loop notices shutdown.
    pub receive_poll_ms: u64,
    pub dedup: DedupConfig,
    pub reconnect: ReconnectPolicy,
    /// Drop an outgoing controller frame identical to the previous one.
    pub skip_unchanged_compact: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            fallback: None,
            protocol: ProtocolVersion::default(),
            heartbeat: HeartbeatConfig::default(),
            receive_poll_ms: DEFAULT_RECEIVE_POLL_MS,
            dedup: DedupConfig::default(),
            reconnect: ReconnectPolicy::default(),
            skip_unchanged_compact: false,
        }
    }
}

impl LinkConfig {
    /// Load a config from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LinkError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| LinkError::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the link cannot run with.
    pub fn validate(&self) -> Result<()> {
        let hb = &self.heartbeat;
        if hb.interval_ms == 0 {
            return Err(LinkError::Config(
                "heartbeat.interval_ms must be > 0".to_string(),
            ));
        }
        if hb.timeout_ms == 0 {
            return Err(LinkError::Config(
                "heartbeat.timeout_ms must be > 0".to_string(),
            ));
        }
        if hb.check_interval_ms == 0 {
            return Err(LinkError::Config(
                "heartbeat.check_interval_ms must be > 0".to_string(),
            ));
        }
        if self.receive_poll_ms == 0 {
            return Err(LinkError::Config("receive_poll_ms must be > 0".to_string()));
        }
        if self.dedup.capacity == 0 {
            return Err(LinkError::Config("dedup.capacity must be > 0".to_string()));
        }
        if let ReconnectPolicy::Reopen { attempts, .. } = self.reconnect {
            if attempts == 0 {
                return Err(LinkError::Config(
                    "reconnect.attempts must be > 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }
}

/// Heartbeat cadence and the liveness timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Encoding of outgoing heartbeats. Defaults to the link protocol.
    pub format: Option<ProtocolVersion>,
    pub interval_ms: u64,
    /// Silence longer than this degrades the link; three times this
    /// disconnects it.
    pub timeout_ms: u64,
    /// How often link state is recomputed.
    pub check_interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: None,
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Bounds on the duplicate-suppression history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Most recent ids remembered.
    pub capacity: usize,
    /// Ids older than this are forgotten. `None` keeps them until evicted
    /// by capacity.
    pub window_ms: Option<u64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DEDUP_CAPACITY,
            window_ms: Some(DEFAULT_DEDUP_WINDOW_MS),
        }
    }
}

/// What the receive loop does after a fatal transport error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Stop the receive loop and stay DISCONNECTED.
    #[default]
    Never,
    /// Reopen the same transport config, waiting `backoff_ms` between tries.
    Reopen { attempts: u32, backoff_ms: u64 },
}
