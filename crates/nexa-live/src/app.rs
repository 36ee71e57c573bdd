//! Main application orchestration.
//!
//! Coordinates:
//! - Realtime client lifecycle (connect on start, dispose on shutdown)
//! - Startup subscriptions
//! - Query cache bindings
//! - Connection metrics and periodic stats

use crate::bindings::register_cache_handlers;
use crate::cache::InMemoryQueryCache;
use crate::config::AppConfig;
use crate::error::AppResult;
use nexa_realtime::{ClientEvent, EventBus, EventKind, RealtimeClient, StatsSnapshot};
use nexa_telemetry::Metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    client: Arc<RealtimeClient>,
    cache: Arc<InMemoryQueryCache>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let client = Arc::new(RealtimeClient::new(config.connection_config()));

        Ok(Self {
            config,
            client,
            cache: Arc::new(InMemoryQueryCache::new()),
        })
    }

    pub fn client(&self) -> &Arc<RealtimeClient> {
        &self.client
    }

    pub fn cache(&self) -> &Arc<InMemoryQueryCache> {
        &self.cache
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Run until `shutdown` resolves, then dispose the client.
    pub async fn run_until<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        info!(url = %self.config.ws_url, "Starting application");

        register_metric_handlers(self.client.events());
        let bindings = register_cache_handlers(self.client.events(), self.cache.clone());
        info!(bindings = bindings.len(), "Query cache bindings registered");
        self.register_startup_subscriptions();

        Metrics::realtime_state_set(self.client.state().as_str());
        self.client.connect(&self.config.ws_url);

        let period = Duration::from_secs(self.config.telemetry.stats_interval_secs.max(1));
        let mut stats_interval = tokio::time::interval(period);
        stats_interval.tick().await;

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                _ = stats_interval.tick() => {
                    self.report_stats();
                }

                signal = &mut shutdown => {
                    info!("Shutdown signal received");
                    break signal;
                }
            }
        };

        info!("Shutting down");
        self.report_stats();
        self.client.dispose().await;

        result.map_err(Into::into)
    }

    /// Record configured subscriptions so they are sent on every open, and
    /// request realtime metrics on each connect.
    fn register_startup_subscriptions(&self) {
        let subs = &self.config.subscriptions;
        let registry = self.client.subscriptions().registry();
        for report_id in &subs.reports {
            registry.add_report(report_id);
        }
        if subs.dashboard {
            registry.set_dashboard();
        }
        info!(
            reports = subs.reports.len(),
            dashboard = subs.dashboard,
            "Startup subscriptions recorded"
        );

        if !subs.realtime_metrics.is_empty() {
            let subscriptions = self.client.subscriptions().clone();
            let metrics = subs.realtime_metrics.clone();
            self.client.on(EventKind::Connected, move |_| {
                if !subscriptions.request_real_time_data(metrics.as_slice()) {
                    return Err("real-time data request was not queued".into());
                }
                Ok(())
            });
        }
    }

    fn report_stats(&self) {
        let stats = self.client.stats();
        export_stats(&stats);
        info!(
            state = %self.client.state(),
            frames_received = stats.frames_received,
            frames_dropped = stats.frames_dropped(),
            envelopes_sent = stats.envelopes_sent,
            sends_dropped = stats.sends_dropped,
            heartbeats_sent = stats.heartbeats_sent,
            reconnect_attempts = stats.reconnect_attempts,
            listener_failures = stats.listener_failures,
            cached = self.cache.len(),
            stale = self.cache.stale_count(),
            "Realtime stats"
        );
    }
}

fn export_stats(stats: &StatsSnapshot) {
    Metrics::client_counter("frames_received", stats.frames_received);
    Metrics::client_counter("frames_dropped", stats.frames_dropped());
    Metrics::client_counter("envelopes_sent", stats.envelopes_sent);
    Metrics::client_counter("sends_dropped", stats.sends_dropped);
    Metrics::client_counter("heartbeats_sent", stats.heartbeats_sent);
    Metrics::client_counter("listener_failures", stats.listener_failures);
}

/// Mirror connection events onto Prometheus metrics.
fn register_metric_handlers(bus: &EventBus) {
    bus.on(EventKind::Connected, |_| {
        Metrics::realtime_connected();
        Metrics::realtime_state_set("connected");
        Ok(())
    });
    bus.on(EventKind::Disconnected, |_| {
        Metrics::realtime_disconnected();
        Metrics::realtime_state_set("disconnected");
        Ok(())
    });
    bus.on(EventKind::Reconnecting, |event| {
        if let ClientEvent::Reconnecting { delay, .. } = event {
            Metrics::reconnect_scheduled(delay.as_secs_f64() * 1000.0);
        }
        Metrics::realtime_state_set("reconnecting");
        Ok(())
    });
    bus.on(EventKind::Error, |_| {
        Metrics::transport_error();
        Ok(())
    });
    bus.on(EventKind::MaxReconnectAttemptsReached, |event| {
        warn!(?event, "Realtime updates unavailable until restart");
        Metrics::reconnect_exhausted();
        Metrics::realtime_state_set("failed");
        Ok(())
    });
    bus.on(EventKind::Message, |event| {
        if let Some(envelope) = event.envelope() {
            Metrics::inbound(&envelope.kind);
        }
        Ok(())
    });
}
