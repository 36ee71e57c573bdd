//! Application configuration.

use crate::error::{AppError, AppResult};
use nexa_realtime::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Realtime server URL (`ws://` or `wss://`).
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_ws_url() -> String {
    "ws://localhost:3001".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            websocket: WsConfig::default(),
            subscriptions: SubscriptionsConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// WebSocket configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Maximum reconnection attempts (0 = infinite). Default: 5.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms). Default: 1000.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Backoff ceiling (ms, 0 = uncapped). Default: 30,000.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Heartbeat interval (ms). Default: 30,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Silence after a heartbeat before reconnecting (ms, 0 = disabled).
    #[serde(default)]
    pub heartbeat_timeout_ms: u64,
    /// Open timeout (ms, 0 = none). Default: 10,000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Outbound queue capacity. Default: 256.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl From<WsConfig> for ConnectionConfig {
    fn from(cfg: WsConfig) -> Self {
        Self {
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            reconnect_base_delay_ms: cfg.reconnect_base_delay_ms,
            reconnect_max_delay_ms: cfg.reconnect_max_delay_ms,
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            heartbeat_timeout_ms: cfg.heartbeat_timeout_ms,
            connect_timeout_ms: cfg.connect_timeout_ms,
            outbound_buffer: cfg.outbound_buffer,
        }
    }
}

/// Subscriptions established at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionsConfig {
    #[serde(default)]
    pub dashboard: bool,
    /// Report ids to follow.
    #[serde(default)]
    pub reports: Vec<String>,
    /// Metric names requested once per connection.
    #[serde(default)]
    pub realtime_metrics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Periodic stats log interval (seconds). Default: 60.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load from `NEXA_CONFIG` or `config/default.toml`, falling back to defaults.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("NEXA_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "ws_url must start with ws:// or wss://, got {:?}",
                self.ws_url
            )));
        }
        if self.websocket.reconnect_base_delay_ms == 0 {
            return Err(AppError::Config(
                "websocket.reconnect_base_delay_ms must be non-zero".to_string(),
            ));
        }
        if self.websocket.heartbeat_interval_ms == 0 {
            return Err(AppError::Config(
                "websocket.heartbeat_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        self.websocket.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.subscriptions.dashboard);
        assert_eq!(config.telemetry.stats_interval_secs, 60);
        assert_eq!(config.connection_config().max_reconnect_attempts, 5);
    }

    #[test]
    fn test_partial_config_takes_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            ws_url = "wss://realtime.example.com/ws"

            [websocket]
            max_reconnect_attempts = 0
            heartbeat_timeout_ms = 5000

            [subscriptions]
            dashboard = true
            reports = ["r-1", "r-2"]
            "#,
        )
        .unwrap();

        let conn = config.connection_config();
        assert_eq!(conn.max_reconnect_attempts, 0);
        assert_eq!(conn.heartbeat_timeout_ms, 5000);
        assert_eq!(conn.reconnect_base_delay_ms, 1000);
        assert_eq!(conn.connect_timeout_ms, 10_000);
        assert!(config.subscriptions.dashboard);
        assert_eq!(config.subscriptions.reports.len(), 2);
        assert!(config.subscriptions.realtime_metrics.is_empty());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let err = AppConfig::from_toml_str(r#"ws_url = "http://example.com""#).unwrap_err();
        assert!(err.to_string().contains("ws://"));
    }

    #[test]
    fn test_rejects_zero_base_delay() {
        let err = AppConfig::from_toml_str(
            r#"
            [websocket]
            reconnect_base_delay_ms = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_heartbeat_interval() {
        let err = AppConfig::from_toml_str(
            r#"
            [websocket]
            heartbeat_interval_ms = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval_ms"));
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let config = AppConfig::from_file(path).unwrap();
        assert!(config.subscriptions.dashboard);
        assert_eq!(config.websocket.reconnect_max_delay_ms, 30_000);
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("ws_url"));
        assert!(toml_str.contains("[websocket]"));
    }
}
