//! Realtime client.
//!
//! Single entry point tying together the connection manager, the event bus
//! and the subscription façade. One client is meant to be shared across the
//! application (wrap it in an `Arc`).

use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState};
use crate::envelope::Envelope;
use crate::event::{ClientEvent, EventKind};
use crate::event_bus::{EventBus, ListenerId, ListenerResult};
use crate::heartbeat::HeartbeatStats;
use crate::send_handle::SendHandle;
use crate::stats::StatsSnapshot;
use crate::subscription::Subscriptions;
use std::sync::Arc;
use tracing::info;

/// Realtime update client.
pub struct RealtimeClient {
    bus: Arc<EventBus>,
    connection: ConnectionManager,
    subscriptions: Subscriptions,
}

impl RealtimeClient {
    pub fn new(config: ConnectionConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let connection = ConnectionManager::new(config, bus.clone());
        let subscriptions = connection.subscriptions();
        Self {
            bus,
            connection,
            subscriptions,
        }
    }

    /// Connect to `url`. Alias of [`connect`](Self::connect).
    pub fn init(&self, url: &str) -> bool {
        self.connect(url)
    }

    /// Start a session. No-op while one is already active.
    pub fn connect(&self, url: &str) -> bool {
        self.connection.connect(url)
    }

    /// Close the socket cleanly; no reconnection follows.
    pub fn disconnect(&self) -> bool {
        self.connection.disconnect()
    }

    /// Disconnect, wait for the driver to exit, then drop every listener and
    /// recorded subscription.
    pub async fn dispose(&self) {
        self.connection.disconnect();
        self.connection.closed().await;
        self.bus.clear_all();
        self.connection.registry().clear();
        info!("Realtime client disposed");
    }

    /// Wait until the current session's driver has exited.
    pub async fn closed(&self) {
        self.connection.closed().await
    }

    pub fn on<F>(&self, event: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.bus.on(event, listener)
    }

    pub fn off(&self, event: EventKind, id: ListenerId) -> bool {
        self.bus.off(event, id)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Queue an envelope. Dropped with a warning unless connected.
    pub fn send(&self, envelope: &Envelope) -> bool {
        self.connection.send(envelope)
    }

    pub fn sender(&self) -> SendHandle {
        self.connection.sender()
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn subscribe_to_report(&self, report_id: &str) -> bool {
        self.subscriptions.subscribe_to_report(report_id)
    }

    pub fn unsubscribe_from_report(&self, report_id: &str) -> bool {
        self.subscriptions.unsubscribe_from_report(report_id)
    }

    pub fn subscribe_to_dashboard(&self) -> bool {
        self.subscriptions.subscribe_to_dashboard()
    }

    pub fn request_real_time_data<S: AsRef<str>>(&self, metrics: &[S]) -> bool {
        self.subscriptions.request_real_time_data(metrics)
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.connection.reconnect_attempts()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.connection.stats()
    }

    pub fn heartbeat_stats(&self) -> HeartbeatStats {
        self.connection.heartbeat_stats()
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.connection.config()
    }
}
