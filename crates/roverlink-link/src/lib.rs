//! Link management for the rover control link.
//!
//! Sits on top of `roverlink-transport` and `roverlink-frame`:
//! - `CommunicationManager` numbers and sends frames, runs the receive
//!   loop and dispatches decoded messages to handlers
//! - `HeartbeatMonitor` derives CONNECTED / DEGRADED / DISCONNECTED from
//!   how recently the peer was heard
//! - `DedupWindow` keeps repeated extended msgIds from being dispatched twice

pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod manager;
pub mod stats;

pub use config::{DedupConfig, HeartbeatConfig, LinkConfig, ReconnectPolicy};
pub use dedup::DedupWindow;
pub use dispatch::{Dispatcher, LinkStateHandler, Message, MessageHandler, MessageKey};
pub use error::{LinkError, Result};
pub use heartbeat::{HeartbeatMonitor, LinkState, LinkTransition};
pub use manager::CommunicationManager;
pub use stats::LinkStats;
