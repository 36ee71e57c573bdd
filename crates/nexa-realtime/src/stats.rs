//! Client counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the connection driver and the send handle.
#[derive(Debug, Default)]
pub struct ClientStats {
    frames_received: AtomicU64,
    frames_undecodable: AtomicU64,
    frames_unknown_type: AtomicU64,
    envelopes_sent: AtomicU64,
    sends_dropped: AtomicU64,
    heartbeats_sent: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_undecodable(&self) {
        self.frames_undecodable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_unknown_type(&self) {
        self.frames_unknown_type.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn envelope_sent(&self) {
        self.envelopes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters. `listener_failures` comes from the event bus.
    pub fn snapshot(&self, listener_failures: u64) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_undecodable: self.frames_undecodable.load(Ordering::Relaxed),
            frames_unknown_type: self.frames_unknown_type.load(Ordering::Relaxed),
            envelopes_sent: self.envelopes_sent.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            listener_failures,
        }
    }
}

/// Serializable counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_undecodable: u64,
    pub frames_unknown_type: u64,
    pub envelopes_sent: u64,
    pub sends_dropped: u64,
    pub heartbeats_sent: u64,
    pub reconnect_attempts: u64,
    pub listener_failures: u64,
}

impl StatsSnapshot {
    /// Frames received but not dispatched.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_undecodable + self.frames_unknown_type
    }
}
