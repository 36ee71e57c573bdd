//! Realtime client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Frame decode error: {0}")]
    Decode(String),

    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;
