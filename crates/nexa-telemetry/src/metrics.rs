//! Prometheus metrics for the realtime client.
//!
//! Covers:
//! - Connection state
//! - Reconnection attempts and exhaustion
//! - Inbound envelopes by type
//! - Client counters (frames, sends, listener failures)
//! - Query cache updates driven by realtime events
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric names,
//! which should crash at startup. These panics only occur during static
//! initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_int_counter, register_int_gauge_vec, CounterVec, Encoder, Gauge, GaugeVec, Histogram,
    IntCounter, IntGaugeVec, TextEncoder,
};

/// Connection states exported on `nexa_realtime_state`.
pub const STATES: [&str; 5] = [
    "disconnected",
    "connecting",
    "connected",
    "reconnecting",
    "failed",
];

/// Realtime connection up (1 = connected, 0 = not connected).
pub static REALTIME_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "nexa_realtime_connected",
        "Realtime connection state (1=connected)"
    )
    .unwrap()
});

/// Labels: state (disconnected/connecting/connected/reconnecting/failed)
pub static REALTIME_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "nexa_realtime_state",
        "Realtime connection current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static REALTIME_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "nexa_realtime_reconnect_total",
        "Total scheduled reconnection attempts"
    )
    .unwrap()
});

/// Scheduled backoff delay in milliseconds.
pub static REALTIME_RECONNECT_DELAY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "nexa_realtime_reconnect_delay_ms",
        "Backoff delay before each reconnection attempt in milliseconds",
        vec![100.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0, 30000.0]
    )
    .unwrap()
});

pub static REALTIME_EXHAUSTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "nexa_realtime_reconnect_exhausted_total",
        "Times the reconnection bound was exhausted"
    )
    .unwrap()
});

pub static REALTIME_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "nexa_realtime_errors_total",
        "Total transport errors (failed opens, read/write errors)"
    )
    .unwrap()
});

/// Labels: type (wire message type)
pub static REALTIME_INBOUND_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nexa_realtime_inbound_total",
        "Total dispatched inbound envelopes by type",
        &["type"]
    )
    .unwrap()
});

/// Client-side counters mirrored from the client's stats snapshot.
/// Labels: counter
pub static REALTIME_CLIENT_COUNTER: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "nexa_realtime_client_counter",
        "Realtime client counters (frames, sends, heartbeats, listener failures)",
        &["counter"]
    )
    .unwrap()
});

/// Labels: op (set/invalidate), root (first query key segment)
pub static CACHE_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "nexa_cache_updates_total",
        "Query cache updates applied from realtime events",
        &["op", "root"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn realtime_connected() {
        REALTIME_CONNECTED.set(1.0);
    }

    pub fn realtime_disconnected() {
        REALTIME_CONNECTED.set(0.0);
    }

    /// Set the active connection state. All other states are reset to 0.
    pub fn realtime_state_set(state: &str) {
        for s in &STATES {
            REALTIME_STATE.with_label_values(&[s]).set(0.0);
        }
        REALTIME_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn reconnect_scheduled(delay_ms: f64) {
        REALTIME_RECONNECT_TOTAL.inc();
        REALTIME_RECONNECT_DELAY_MS.observe(delay_ms);
    }

    pub fn reconnect_exhausted() {
        REALTIME_EXHAUSTED_TOTAL.inc();
    }

    pub fn transport_error() {
        REALTIME_ERRORS_TOTAL.inc();
    }

    pub fn inbound(kind: &str) {
        REALTIME_INBOUND_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn client_counter(name: &str, value: u64) {
        REALTIME_CLIENT_COUNTER
            .with_label_values(&[name])
            .set(i64::try_from(value).unwrap_or(i64::MAX));
    }

    pub fn cache_set(root: &str) {
        CACHE_UPDATES_TOTAL.with_label_values(&["set", root]).inc();
    }

    pub fn cache_invalidated(root: &str) {
        CACHE_UPDATES_TOTAL
            .with_label_values(&["invalidate", root])
            .inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_set_is_exclusive() {
        Metrics::realtime_state_set("reconnecting");
        assert_eq!(
            REALTIME_STATE.with_label_values(&["reconnecting"]).get(),
            1.0
        );
        Metrics::realtime_state_set("connected");
        assert_eq!(
            REALTIME_STATE.with_label_values(&["reconnecting"]).get(),
            0.0
        );
        assert_eq!(REALTIME_STATE.with_label_values(&["connected"]).get(), 1.0);
    }

    #[test]
    fn test_render_includes_recorded_metrics() {
        Metrics::inbound("NOTIFICATION");
        Metrics::cache_invalidated("notifications");
        Metrics::reconnect_scheduled(1000.0);

        let text = Metrics::render().unwrap();
        assert!(text.contains("nexa_realtime_inbound_total"));
        assert!(text.contains("nexa_cache_updates_total"));
        assert!(text.contains("nexa_realtime_reconnect_delay_ms"));
    }

    #[test]
    fn test_client_counter_saturates() {
        Metrics::client_counter("frames_received", u64::MAX);
        assert_eq!(
            REALTIME_CLIENT_COUNTER
                .with_label_values(&["frames_received"])
                .get(),
            i64::MAX
        );
    }
}
