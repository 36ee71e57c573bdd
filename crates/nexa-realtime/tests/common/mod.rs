//! Mock realtime server for integration tests.
//!
//! Accepts WebSocket connections, records every text frame it receives, and
//! lets a test push frames to connected clients, drop them without a close
//! handshake, or stop listening altogether.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    PushBinary(Vec<u8>),
    Ping(Vec<u8>),
    /// Drop the TCP stream without sending a close frame.
    Drop,
}

/// A mock realtime server.
pub struct MockRealtimeServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    control: broadcast::Sender<Control>,
    messages: Arc<Mutex<Vec<String>>>,
    pongs: Arc<Mutex<Vec<Vec<u8>>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockRealtimeServer {
    /// Start a new mock server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let pongs = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let shutdown = CancellationToken::new();
        let (control, _) = broadcast::channel(64);

        let messages_clone = messages.clone();
        let pongs_clone = pongs.clone();
        let connections_clone = connections.clone();
        let shutdown_clone = shutdown.clone();
        let control_clone = control.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            messages_clone.clone(),
                            pongs_clone.clone(),
                            connections_clone.clone(),
                            control_clone.subscribe(),
                            shutdown_clone.clone(),
                        ));
                    }
                    () = shutdown_clone.cancelled() => break,
                }
            }
        });

        Self {
            addr,
            shutdown,
            control,
            messages,
            pongs,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Completed WebSocket handshakes.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// All text frames received, in order.
    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Received frames whose `type` equals `kind`.
    pub async fn received_of_type(&self, kind: &str) -> Vec<Value> {
        self.received_messages()
            .await
            .iter()
            .filter_map(|m| serde_json::from_str::<Value>(m).ok())
            .filter(|v| v["type"] == kind)
            .collect()
    }

    /// Send a raw text frame to every connected client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control.send(Control::Push(text.into()));
    }

    /// Send a binary frame to every connected client.
    pub fn push_binary(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.control.send(Control::PushBinary(bytes.into()));
    }

    /// Send a ping to every connected client.
    pub fn ping(&self, data: impl Into<Vec<u8>>) {
        let _ = self.control.send(Control::Ping(data.into()));
    }

    /// Payloads of every pong received from clients.
    pub async fn received_pongs(&self) -> Vec<Vec<u8>> {
        self.pongs.lock().await.clone()
    }

    /// Drop every client connection without a close handshake.
    pub fn drop_clients(&self) {
        let _ = self.control.send(Control::Drop);
    }

    /// Stop accepting and drop every client. New connects are refused.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<String>>>,
    pongs: Arc<Mutex<Vec<Vec<u8>>>>,
    connections: Arc<Mutex<u32>>,
    mut control: broadcast::Receiver<Control>,
    shutdown: CancellationToken,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    *connections.lock().await += 1;

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => messages.lock().await.push(text),
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(data))) => pongs.lock().await.push(data),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            cmd = control.recv() => match cmd {
                Ok(Control::Push(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Ok(Control::PushBinary(bytes)) => {
                    let _ = write.send(Message::Binary(bytes)).await;
                }
                Ok(Control::Ping(data)) => {
                    let _ = write.send(Message::Ping(data)).await;
                }
                Ok(Control::Drop) | Err(_) => break,
            },
            () = shutdown.cancelled() => break,
        }
    }
}

/// Poll `check` every 10ms until it returns true or `within` elapses.
pub async fn wait_until<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(within, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Synchronous variant of [`wait_until`].
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    wait_until(within, || std::future::ready(check())).await
}

/// Install a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("nexa_realtime=debug")
        .try_init();
}
