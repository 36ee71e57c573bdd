//! Realtime update client for Nexa Manager.
//!
//! Keeps one WebSocket connection to the realtime server and fans decoded
//! envelopes out to in-process listeners:
//! - Automatic reconnection with capped exponential backoff and a bounded attempt count
//! - Heartbeat envelopes with optional silence timeout
//! - Event bus with per-listener error and panic isolation
//! - Subscription façade with restore-on-reconnect

pub mod client;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod heartbeat;
pub mod reconnect;
pub mod send_handle;
pub mod stats;
pub mod subscription;

pub use client::RealtimeClient;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use envelope::{Envelope, InboundKind, OutboundKind};
pub use error::{RealtimeError, RealtimeResult};
pub use event::{ClientEvent, EventKind};
pub use event_bus::{EventBus, ListenerId, ListenerResult};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};
pub use reconnect::{ReconnectController, ReconnectPolicy};
pub use send_handle::SendHandle;
pub use stats::{ClientStats, StatsSnapshot};
pub use subscription::{SubscriptionRegistry, Subscriptions};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
