use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Silence of this many timeouts turns DEGRADED into DISCONNECTED.
const DISCONNECT_FACTOR: u32 = 3;

/// Liveness of the link, derived from how recently the peer was heard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    Connected,
    Degraded,
    Disconnected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Connected => "CONNECTED",
            LinkState::Degraded => "DEGRADED",
            LinkState::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change of link state, reported once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkTransition {
    pub from: LinkState,
    pub to: LinkState,
    /// Time since the last frame from the peer, if any was ever received.
    #[serde(skip)]
    pub silence: Option<Duration>,
}

/// Tracks traffic timestamps and derives `LinkState`.
///
/// All methods take the current instant explicitly so state derivation can
/// be driven deterministically; the manager passes `Instant::now()`.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    last_sent_at: Option<Instant>,
    last_received_at: Option<Instant>,
    state: LinkState,
}

impl HeartbeatMonitor {
    /// A monitor that has heard nothing yet; it starts DISCONNECTED.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_sent_at: None,
            last_received_at: None,
            state: LinkState::Disconnected,
        }
    }

    /// Note that any valid frame arrived from the peer.
    pub fn record_received_at(&mut self, now: Instant) {
        self.last_received_at = Some(now);
    }

    /// Note that a heartbeat went out.
    pub fn record_sent_at(&mut self, now: Instant) {
        self.last_sent_at = Some(now);
    }

    /// Whether a heartbeat should be sent at `now`.
    pub fn due_at(&self, now: Instant) -> bool {
        match self.last_sent_at {
            None => true,
            Some(sent) => now.saturating_duration_since(sent) >= self.interval,
        }
    }

    /// The state traffic timestamps imply at `now`, without changing anything.
    pub fn state_at(&self, now: Instant) -> LinkState {
        let Some(received) = self.last_received_at else {
            return LinkState::Disconnected;
        };
        let silence = now.saturating_duration_since(received);
        if silence < self.timeout {
            LinkState::Connected
        } else if silence < self.timeout * DISCONNECT_FACTOR {
            LinkState::Degraded
        } else {
            LinkState::Disconnected
        }
    }

    /// Recompute the state. Returns the transition if it changed.
    pub fn check_at(&mut self, now: Instant) -> Option<LinkTransition> {
        let next = self.state_at(now);
        self.transition_to(next, now)
    }

    /// Force DISCONNECTED after a fatal transport error. The next frame from
    /// the peer brings the link back on the following check.
    pub fn force_disconnected(&mut self, now: Instant) -> Option<LinkTransition> {
        let transition = self.transition_to(LinkState::Disconnected, now);
        self.last_received_at = None;
        transition
    }

    fn transition_to(&mut self, next: LinkState, now: Instant) -> Option<LinkTransition> {
        if next == self.state {
            return None;
        }
        let transition = LinkTransition {
            from: self.state,
            to: next,
            silence: self
                .last_received_at
                .map(|received| now.saturating_duration_since(received)),
        };
        self.state = next;
        Some(transition)
    }

    /// State as of the last check.
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn last_received_at(&self) -> Option<Instant> {
        self.last_received_at
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
