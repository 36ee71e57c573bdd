//! Heartbeat monitoring for the realtime socket.
//!
//! Sends a `HEARTBEAT` envelope every interval while connected and tracks
//! inbound activity. With a non-zero timeout, a session that stays silent for
//! longer than the timeout after a heartbeat was sent is reported as timed out.

use crate::envelope::{self, Envelope};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Default)]
struct HeartbeatInner {
    last_sent: Option<DateTime<Utc>>,
    last_ack: Option<DateTime<Utc>>,
    last_message: Option<DateTime<Utc>>,
    awaiting_activity: bool,
}

/// Heartbeat monitor for one client.
pub struct HeartbeatManager {
    interval_ms: u64,
    /// 0 disables timeout detection.
    timeout_ms: u64,
    inner: RwLock<HeartbeatInner>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            inner: RwLock::new(HeartbeatInner::default()),
        }
    }

    /// Reset state (called when a session opens).
    pub fn reset(&self) {
        *self.inner.write() = HeartbeatInner {
            last_message: Some(Utc::now()),
            ..HeartbeatInner::default()
        };
    }

    /// Periodic ticker for one session. The first tick fires one interval after open.
    pub fn ticker(&self) -> Interval {
        let period = Duration::from_millis(self.interval_ms.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Build the next heartbeat envelope and record that it was sent.
    pub fn next_heartbeat(&self) -> Envelope {
        let hb = envelope::heartbeat();
        let mut inner = self.inner.write();
        inner.last_sent = Some(Utc::now());
        inner.awaiting_activity = true;
        debug!("Heartbeat sent");
        hb
    }

    /// Record any inbound frame.
    pub fn record_message(&self) {
        let mut inner = self.inner.write();
        inner.last_message = Some(Utc::now());
        inner.awaiting_activity = false;
    }

    /// Record an inbound `HEARTBEAT` envelope.
    pub fn record_ack(&self) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        if let Some(sent) = inner.last_sent {
            debug!(rtt_ms = (now - sent).num_milliseconds(), "Heartbeat acknowledged");
        }
        inner.last_ack = Some(now);
    }

    /// True if timeout detection is enabled and the session has been silent
    /// for longer than the timeout since the last heartbeat.
    pub fn is_timed_out(&self) -> bool {
        if self.timeout_ms == 0 {
            return false;
        }
        let inner = self.inner.read();
        if !inner.awaiting_activity {
            return false;
        }
        match inner.last_sent {
            Some(sent) => (Utc::now() - sent).num_milliseconds() > self.timeout_ms as i64,
            None => false,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn stats(&self) -> HeartbeatStats {
        let inner = self.inner.read();
        HeartbeatStats {
            last_sent: inner.last_sent,
            last_ack: inner.last_ack,
            last_message: inner.last_message,
            awaiting_activity: inner.awaiting_activity,
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_sent: Option<DateTime<Utc>>,
    pub last_ack: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
    pub awaiting_activity: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_initial_state() {
        let hb = HeartbeatManager::new(30_000, 10_000);
        assert!(!hb.is_timed_out());
        assert!(!hb.stats().awaiting_activity);
    }

    #[test]
    fn test_heartbeat_envelope_marks_awaiting() {
        let hb = HeartbeatManager::new(30_000, 10_000);
        let env = hb.next_heartbeat();
        assert_eq!(env.kind, "HEARTBEAT");
        assert!(hb.stats().awaiting_activity);
        assert!(hb.stats().last_sent.is_some());

        hb.record_message();
        assert!(!hb.stats().awaiting_activity);
    }

    #[test]
    fn test_timeout_detection() {
        let hb = HeartbeatManager::new(10, 5);
        hb.reset();
        hb.next_heartbeat();
        std::thread::sleep(Duration::from_millis(20));
        assert!(hb.is_timed_out());

        hb.record_message();
        assert!(!hb.is_timed_out());
    }

    #[test]
    fn test_timeout_disabled_by_zero() {
        let hb = HeartbeatManager::new(10, 0);
        hb.next_heartbeat();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!hb.is_timed_out());
    }

    #[test]
    fn test_ack_recorded() {
        let hb = HeartbeatManager::new(30_000, 0);
        hb.next_heartbeat();
        hb.record_ack();
        assert!(hb.stats().last_ack.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_first_tick_after_one_interval() {
        let hb = HeartbeatManager::new(1_000, 0);
        let start = Instant::now();
        let mut ticker = hb.ticker();
        ticker.tick().await;
        assert!(start.elapsed() >= Duration::from_millis(1_000));
    }
}
