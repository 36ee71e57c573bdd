//! Application integration tests.
//!
//! Runs the application against a local WebSocket server and checks that
//! configured subscriptions reach the server and that realtime events drive
//! the query cache.

use futures_util::{SinkExt, StreamExt};
use nexa_live::{AppConfig, Application, QueryCache, QueryKey};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Single-connection server: records inbound frames and forwards `push` frames.
async fn start_server() -> (String, Arc<Mutex<Vec<Value>>>, mpsc::Sender<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let received = Arc::new(Mutex::new(Vec::new()));
    let (push_tx, mut push_rx) = mpsc::channel::<String>(16);

    let received_clone = received.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(v) = serde_json::from_str(&text) {
                            received_clone.lock().await.push(v);
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
                Some(text) = push_rx.recv() => {
                    let _ = write.send(Message::Text(text)).await;
                }
            }
        }
    });

    (url, received, push_tx)
}

async fn wait_for<F: FnMut() -> bool>(mut check: F) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_app_subscribes_and_updates_cache() {
    let (url, received, push) = start_server().await;

    let mut config = AppConfig::from_toml_str(&format!(
        r#"
        ws_url = "{url}"

        [websocket]
        reconnect_base_delay_ms = 50

        [subscriptions]
        dashboard = true
        reports = ["42"]
        realtime_metrics = ["revenue"]
        "#
    ))
    .unwrap();
    config.telemetry.stats_interval_secs = 1;

    let app = Application::new(config).unwrap();
    let client = app.client().clone();
    let cache = app.cache().clone();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(app.run_until(async move {
        let _ = stop_rx.await;
        Ok(())
    }));

    assert!(wait_for(|| client.is_connected()).await);

    // Restored subscriptions plus the per-connect metrics request.
    let mut kinds = Vec::new();
    for _ in 0..500 {
        kinds = received
            .lock()
            .await
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        if kinds.len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(kinds.contains(&"SUBSCRIBE_REPORT".to_string()));
    assert!(kinds.contains(&"SUBSCRIBE_DASHBOARD".to_string()));
    assert!(kinds.contains(&"REQUEST_REAL_TIME_DATA".to_string()));

    let reports = QueryKey::from(["reports"]);
    let report = QueryKey::from(["report", "42"]);
    let other_report = QueryKey::from(["report", "7"]);
    cache.set(reports.clone(), serde_json::json!([{"id": "42"}]));
    cache.set(report.clone(), serde_json::json!({"id": "42", "status": "running"}));
    cache.set(other_report.clone(), serde_json::json!({"id": "7"}));

    push.send(r#"{"type":"DASHBOARD_UPDATE","payload":{"widgets":2}}"#.to_string())
        .await
        .unwrap();
    push.send(r#"{"type":"REPORT_STATUS_UPDATE","payload":{"reportId":"42"}}"#.to_string())
        .await
        .unwrap();

    let dashboard = QueryKey::from(["dashboard"]);
    assert!(wait_for(|| cache.get(&dashboard).is_some()).await);
    assert_eq!(cache.get(&dashboard).unwrap().value["widgets"], 2);

    assert!(wait_for(|| cache.get(&report).is_some_and(|e| e.stale)).await);
    assert!(cache.get(&reports).unwrap().stale);
    assert!(!cache.get(&other_report).unwrap().stale);

    stop_tx.send(()).unwrap();
    tokio_test::assert_ok!(run.await.unwrap());
    assert!(!client.is_connected());
    assert!(client.subscriptions().registry().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = AppConfig {
        ws_url: "localhost:3001".to_string(),
        ..Default::default()
    };
    assert!(Application::new(config).is_err());
}
