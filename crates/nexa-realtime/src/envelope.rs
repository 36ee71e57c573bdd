//! Wire envelope types.
//!
//! Every frame on the realtime socket is a JSON text frame of the form
//! `{"type": "<MESSAGE_TYPE>", "payload": <any>, "timestamp"?: <epoch-ms>}`.

use crate::error::{RealtimeError, RealtimeResult};
use crate::event::EventKind;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

// ============================================================================
// Envelope
// ============================================================================

/// Typed `{type, payload}` wire message unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind (e.g. "REPORT_STATUS_UPDATE").
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload (flexible JSON). Missing payload decodes as `null`.
    #[serde(default)]
    pub payload: Value,
    /// Sender timestamp in epoch milliseconds.
    ///
    /// Inbound values may be any JSON number; fractional milliseconds are
    /// truncated and values that are not finite numbers decode as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_epoch_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

fn lenient_epoch_ms<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        _ => None,
    })
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Decode an inbound text frame.
    ///
    /// Fails if the frame is not JSON, not an object, or has no string `type`.
    pub fn decode(text: &str) -> RealtimeResult<Self> {
        serde_json::from_str(text).map_err(|e| RealtimeError::Decode(e.to_string()))
    }

    /// Encode for transmission.
    pub fn encode(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolve the inbound kind, if this is a known inbound type.
    pub fn inbound_kind(&self) -> Option<InboundKind> {
        InboundKind::from_wire(&self.kind)
    }

    /// Get a string field from an object payload.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(|v| v.as_str())
    }
}

// ============================================================================
// Inbound kinds (server -> client)
// ============================================================================

/// Known inbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    ReportStatusUpdate,
    RealTimeData,
    ReportGenerated,
    DashboardUpdate,
    Notification,
    Heartbeat,
}

impl InboundKind {
    pub const ALL: [InboundKind; 6] = [
        Self::ReportStatusUpdate,
        Self::RealTimeData,
        Self::ReportGenerated,
        Self::DashboardUpdate,
        Self::Notification,
        Self::Heartbeat,
    ];

    /// Wire name of this type.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::ReportStatusUpdate => "REPORT_STATUS_UPDATE",
            Self::RealTimeData => "REAL_TIME_DATA",
            Self::ReportGenerated => "REPORT_GENERATED",
            Self::DashboardUpdate => "DASHBOARD_UPDATE",
            Self::Notification => "NOTIFICATION",
            Self::Heartbeat => "HEARTBEAT",
        }
    }

    /// Parse a wire name. Matching is exact.
    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_wire() == kind)
    }

    /// Canonical event this type dispatches to.
    pub fn event(&self) -> EventKind {
        match self {
            Self::ReportStatusUpdate => EventKind::ReportStatusUpdate,
            Self::RealTimeData => EventKind::RealTimeData,
            Self::ReportGenerated => EventKind::ReportGenerated,
            Self::DashboardUpdate => EventKind::DashboardUpdate,
            Self::Notification => EventKind::Notification,
            Self::Heartbeat => EventKind::Heartbeat,
        }
    }
}

impl std::fmt::Display for InboundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ============================================================================
// Outbound kinds (client -> server)
// ============================================================================

/// Known outbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundKind {
    SubscribeReport,
    UnsubscribeReport,
    SubscribeDashboard,
    RequestRealTimeData,
    Heartbeat,
}

impl OutboundKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::SubscribeReport => "SUBSCRIBE_REPORT",
            Self::UnsubscribeReport => "UNSUBSCRIBE_REPORT",
            Self::SubscribeDashboard => "SUBSCRIBE_DASHBOARD",
            Self::RequestRealTimeData => "REQUEST_REAL_TIME_DATA",
            Self::Heartbeat => "HEARTBEAT",
        }
    }

    /// Build an envelope of this kind.
    pub fn envelope(&self, payload: Value) -> Envelope {
        Envelope::new(self.as_wire(), payload)
    }
}

/// `SUBSCRIBE_REPORT{reportId}`.
pub fn subscribe_report(report_id: &str) -> Envelope {
    OutboundKind::SubscribeReport.envelope(json!({ "reportId": report_id }))
}

/// `UNSUBSCRIBE_REPORT{reportId}`.
pub fn unsubscribe_report(report_id: &str) -> Envelope {
    OutboundKind::UnsubscribeReport.envelope(json!({ "reportId": report_id }))
}

/// `SUBSCRIBE_DASHBOARD{}`.
pub fn subscribe_dashboard() -> Envelope {
    OutboundKind::SubscribeDashboard.envelope(json!({}))
}

/// `REQUEST_REAL_TIME_DATA{metrics:[...]}`.
pub fn request_real_time_data<S: AsRef<str>>(metrics: &[S]) -> Envelope {
    let metrics: Vec<&str> = metrics.iter().map(AsRef::as_ref).collect();
    OutboundKind::RequestRealTimeData.envelope(json!({ "metrics": metrics }))
}

/// `HEARTBEAT{timestamp}`.
pub fn heartbeat() -> Envelope {
    let now = Utc::now().timestamp_millis();
    Envelope {
        kind: OutboundKind::Heartbeat.as_wire().to_string(),
        payload: json!({ "timestamp": now }),
        timestamp: Some(now),
    }
}
