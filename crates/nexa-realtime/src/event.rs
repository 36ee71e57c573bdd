//! Client events delivered through the event bus.

use crate::envelope::{Envelope, InboundKind};
use crate::error::RealtimeError;
use std::str::FromStr;
use std::time::Duration;

/// Event names that listeners register under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Reconnected,
    Disconnected,
    Reconnecting,
    Error,
    MaxReconnectAttemptsReached,
    Message,
    ReportStatusUpdate,
    RealTimeData,
    ReportGenerated,
    DashboardUpdate,
    Notification,
    Heartbeat,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        Self::Connected,
        Self::Reconnected,
        Self::Disconnected,
        Self::Reconnecting,
        Self::Error,
        Self::MaxReconnectAttemptsReached,
        Self::Message,
        Self::ReportStatusUpdate,
        Self::RealTimeData,
        Self::ReportGenerated,
        Self::DashboardUpdate,
        Self::Notification,
        Self::Heartbeat,
    ];

    /// Canonical event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnected => "reconnected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
            Self::MaxReconnectAttemptsReached => "maxReconnectAttemptsReached",
            Self::Message => "message",
            Self::ReportStatusUpdate => "reportStatusUpdate",
            Self::RealTimeData => "realTimeData",
            Self::ReportGenerated => "reportGenerated",
            Self::DashboardUpdate => "dashboardUpdate",
            Self::Notification => "notification",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| RealtimeError::UnknownEvent(s.to_string()))
    }
}

/// Event emitted by the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Socket opened.
    Connected { url: String },
    /// Socket opened after one or more reconnection attempts.
    Reconnected { attempts: u32 },
    /// Socket closed. `clean` is true only for closes requested via `disconnect()`.
    Disconnected {
        code: Option<u16>,
        reason: String,
        clean: bool,
    },
    /// A reconnection attempt is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Transport-level error (failed open, read/write error).
    Error { message: String },
    /// Reconnection bound exhausted; no further automatic retries.
    MaxReconnectAttemptsReached { attempts: u32 },
    /// Any dispatched inbound envelope.
    Message(Envelope),
    /// A known inbound envelope, routed to its canonical event.
    Inbound {
        kind: InboundKind,
        envelope: Envelope,
    },
}

impl ClientEvent {
    /// Event name this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Reconnected { .. } => EventKind::Reconnected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::Error { .. } => EventKind::Error,
            Self::MaxReconnectAttemptsReached { .. } => EventKind::MaxReconnectAttemptsReached,
            Self::Message(_) => EventKind::Message,
            Self::Inbound { kind, .. } => kind.event(),
        }
    }

    /// Envelope carried by message events.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Message(envelope) | Self::Inbound { envelope, .. } => Some(envelope),
            _ => None,
        }
    }

    /// Payload carried by message events.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.envelope().map(|e| &e.payload)
    }
}
