use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use roverlink_frame::TelemetryPayload;
use serde::Serialize;

/// Snapshot of link traffic counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Frames that failed to decode and were discarded.
    pub frames_dropped: u64,
    pub duplicates_dropped: u64,
    pub heartbeats_sent: u64,
    /// Most recent telemetry payload from the peer.
    pub last_telemetry: Option<TelemetryPayload>,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    duplicates_dropped: AtomicU64,
    heartbeats_sent: AtomicU64,
    last_telemetry: Mutex<Option<TelemetryPayload>>,
}

impl StatsCounters {
    pub(crate) fn sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn duplicate(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn heartbeat(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn telemetry(&self, payload: &TelemetryPayload) {
        *self
            .last_telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(payload.clone());
    }

    pub(crate) fn snapshot(&self) -> LinkStats {
        LinkStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            last_telemetry: self
                .last_telemetry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
