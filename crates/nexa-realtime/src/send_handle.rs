//! Send handle for outbound envelopes.
//!
//! Sending is best-effort and at-most-once: an envelope is queued only while
//! the connection is `Connected`, the caller is never blocked, and nothing is
//! retried. Frames still queued when a connection drops are discarded by the
//! driver before the next session starts.

use crate::connection::ConnectionState;
use crate::envelope::Envelope;
use crate::stats::ClientStats;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Cloneable handle for queueing outbound frames.
#[derive(Clone)]
pub struct SendHandle {
    tx: mpsc::Sender<String>,
    state: Arc<RwLock<ConnectionState>>,
    stats: Arc<ClientStats>,
}

impl SendHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<String>,
        state: Arc<RwLock<ConnectionState>>,
        stats: Arc<ClientStats>,
    ) -> Self {
        Self { tx, state, stats }
    }

    /// Queue an envelope for sending.
    ///
    /// Returns true if the frame was queued. Returning true is not a delivery
    /// guarantee; the connection may still drop before the frame is written.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let state = self.connection_state();
        if state != ConnectionState::Connected {
            warn!(kind = %envelope.kind, %state, "Not connected, dropping outbound envelope");
            self.stats.send_dropped();
            return false;
        }

        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e, "Failed to encode outbound envelope");
                self.stats.send_dropped();
                return false;
            }
        };

        match self.tx.try_send(text) {
            Ok(()) => {
                debug!(kind = %envelope.kind, "Envelope queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(kind = %envelope.kind, "Outbound buffer full, dropping envelope");
                self.stats.send_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(kind = %envelope.kind, "Outbound channel closed, dropping envelope");
                self.stats.send_dropped();
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }
}
