//! Prometheus metrics and structured logging for Nexa Manager realtime services.
//!
//! - Prometheus metrics for connection state, reconnection, inbound traffic and cache updates
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
