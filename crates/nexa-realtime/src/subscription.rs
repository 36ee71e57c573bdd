//! Subscription façade.
//!
//! Builds outbound subscription envelopes and sends them through the send
//! handle. Report and dashboard subscriptions are recorded so the connection
//! driver can restore them whenever a session opens.

use crate::envelope::{self, Envelope};
use crate::send_handle::SendHandle;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Recorded {
    reports: BTreeSet<String>,
    dashboard: bool,
}

/// Subscriptions to restore after (re)connect.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Recorded>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_report(&self, report_id: &str) -> bool {
        self.inner.write().reports.insert(report_id.to_string())
    }

    pub fn remove_report(&self, report_id: &str) -> bool {
        self.inner.write().reports.remove(report_id)
    }

    pub fn set_dashboard(&self) {
        self.inner.write().dashboard = true;
    }

    pub fn reports(&self) -> Vec<String> {
        self.inner.read().reports.iter().cloned().collect()
    }

    pub fn has_dashboard(&self) -> bool {
        self.inner.read().dashboard
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.reports.is_empty() && !inner.dashboard
    }

    pub fn clear(&self) {
        *self.inner.write() = Recorded::default();
    }

    /// Envelopes that re-establish every recorded subscription.
    pub fn restore_envelopes(&self) -> Vec<Envelope> {
        let inner = self.inner.read();
        let mut out: Vec<Envelope> = inner
            .reports
            .iter()
            .map(|id| envelope::subscribe_report(id))
            .collect();
        if inner.dashboard {
            out.push(envelope::subscribe_dashboard());
        }
        out
    }
}

/// Convenience layer over the send handle.
#[derive(Clone)]
pub struct Subscriptions {
    sender: SendHandle,
    registry: Arc<SubscriptionRegistry>,
}

impl Subscriptions {
    pub fn new(sender: SendHandle, registry: Arc<SubscriptionRegistry>) -> Self {
        Self { sender, registry }
    }

    /// Subscribe to status updates for one report.
    ///
    /// Returns whether the envelope was queued now; the subscription is
    /// recorded either way and restored on the next open.
    pub fn subscribe_to_report(&self, report_id: &str) -> bool {
        if self.registry.add_report(report_id) {
            info!(report_id, "Subscribing to report");
        }
        self.sender.send(&envelope::subscribe_report(report_id))
    }

    pub fn unsubscribe_from_report(&self, report_id: &str) -> bool {
        if self.registry.remove_report(report_id) {
            info!(report_id, "Unsubscribing from report");
        }
        self.sender.send(&envelope::unsubscribe_report(report_id))
    }

    pub fn subscribe_to_dashboard(&self) -> bool {
        self.registry.set_dashboard();
        self.sender.send(&envelope::subscribe_dashboard())
    }

    /// One-shot request; not restored on reconnect.
    pub fn request_real_time_data<S: AsRef<str>>(&self, metrics: &[S]) -> bool {
        debug!(count = metrics.len(), "Requesting real-time data");
        self.sender.send(&envelope::request_real_time_data(metrics))
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}
