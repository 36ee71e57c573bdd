//! Realtime event to query cache bindings.
//!
//! | Event                | Cache operation                                          |
//! |----------------------|----------------------------------------------------------|
//! | `reportStatusUpdate` | invalidate `["reports"]` and `["report", id]`            |
//! | `reportGenerated`    | set `["report", id]` to the payload, invalidate `["reports"]` |
//! | `dashboardUpdate`    | set `["dashboard"]` to the payload                       |
//! | `realTimeData`       | set `["realtime", name]` for each payload member         |
//! | `notification`       | invalidate `["notifications"]`                           |

use crate::cache::{QueryCache, QueryKey};
use nexa_realtime::{ClientEvent, EventBus, EventKind, ListenerId};
use nexa_telemetry::Metrics;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Registrations made by [`register_cache_handlers`].
#[derive(Debug, Default)]
pub struct CacheBindings {
    ids: Vec<(EventKind, ListenerId)>,
}

impl CacheBindings {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Remove every binding from `bus`.
    pub fn unregister(self, bus: &EventBus) {
        for (kind, id) in self.ids {
            bus.off(kind, id);
        }
    }
}

/// Register the cache bindings on `bus`.
pub fn register_cache_handlers(bus: &EventBus, cache: Arc<dyn QueryCache>) -> CacheBindings {
    let mut bindings = CacheBindings::default();

    let c = cache.clone();
    bindings.ids.push((
        EventKind::ReportStatusUpdate,
        bus.on(EventKind::ReportStatusUpdate, move |event| {
            let id = report_id(payload(event)?).ok_or("reportStatusUpdate without reportId")?;
            invalidate(c.as_ref(), QueryKey::from(["reports"]));
            invalidate(c.as_ref(), QueryKey::from(["report".to_string(), id]));
            Ok(())
        }),
    ));

    let c = cache.clone();
    bindings.ids.push((
        EventKind::ReportGenerated,
        bus.on(EventKind::ReportGenerated, move |event| {
            let payload = payload(event)?;
            let id = report_id(payload).ok_or("reportGenerated without reportId")?;
            set(c.as_ref(), QueryKey::from(["report".to_string(), id]), payload.clone());
            invalidate(c.as_ref(), QueryKey::from(["reports"]));
            Ok(())
        }),
    ));

    let c = cache.clone();
    bindings.ids.push((
        EventKind::DashboardUpdate,
        bus.on(EventKind::DashboardUpdate, move |event| {
            set(c.as_ref(), QueryKey::from(["dashboard"]), payload(event)?.clone());
            Ok(())
        }),
    ));

    let c = cache.clone();
    bindings.ids.push((
        EventKind::RealTimeData,
        bus.on(EventKind::RealTimeData, move |event| {
            let metrics = payload(event)?
                .as_object()
                .ok_or("realTimeData payload is not an object")?;
            for (name, value) in metrics {
                set(
                    c.as_ref(),
                    QueryKey::from(["realtime".to_string(), name.clone()]),
                    value.clone(),
                );
            }
            Ok(())
        }),
    ));

    let c = cache;
    bindings.ids.push((
        EventKind::Notification,
        bus.on(EventKind::Notification, move |_| {
            invalidate(c.as_ref(), QueryKey::from(["notifications"]));
            Ok(())
        }),
    ));

    bindings
}

fn payload(event: &ClientEvent) -> Result<&Value, Box<dyn std::error::Error + Send + Sync>> {
    event
        .payload()
        .ok_or_else(|| format!("{} event carries no payload", event.kind()).into())
}

/// `reportId` as a string; numeric ids are accepted.
fn report_id(payload: &Value) -> Option<String> {
    match payload.get("reportId")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn invalidate(cache: &dyn QueryCache, key: QueryKey) {
    let marked = cache.invalidate(&key);
    Metrics::cache_invalidated(key.root());
    debug!(key = %key, marked, "Query cache invalidated");
}

fn set(cache: &dyn QueryCache, key: QueryKey, value: Value) {
    Metrics::cache_set(key.root());
    debug!(key = %key, "Query cache updated");
    cache.set(key, value);
}
