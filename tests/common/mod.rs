//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use capture_relay::capture::{CaptureEngine, CaptureId};
use capture_relay::http::wire::split_data_frame;
use capture_relay::config::TlsConfig;
use capture_relay::{CaptureServer, RelayConfig, Shutdown};

pub type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A relay running on an ephemeral port.
pub struct Relay {
    pub addr: SocketAddr,
    pub tls_addr: Option<SocketAddr>,
    pub engine: Arc<CaptureEngine>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

impl Relay {
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(15), self.task).await;
    }
}

pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// Add an ephemeral TLS listener backed by a fresh self-signed certificate
/// written into `dir`.
pub fn with_self_signed_tls(mut config: RelayConfig, dir: &Path) -> RelayConfig {
    let certified =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    config.tls = Some(TlsConfig {
        bind_address: "127.0.0.1:0".to_string(),
        cert_path: cert_path.to_string_lossy().into_owned(),
        key_path: key_path.to_string_lossy().into_owned(),
    });
    config
}

pub async fn start_relay(config: RelayConfig) -> Relay {
    let server = CaptureServer::new(config);
    let bindings = server.bind().await.expect("bind relay");
    let addr = bindings.plain.local_addr().unwrap();
    let tls_addr = bindings.tls.as_ref().map(|(listener, _)| listener.local_addr().unwrap());
    let engine = server.engine().clone();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.serve(bindings, shutdown.clone()));
    Relay {
        addr,
        tls_addr,
        engine,
        shutdown,
        task,
    }
}

/// Connect a viewer and wait until it has joined `namespace`.
pub async fn connect_viewer(addr: SocketAddr, namespace: &str) -> Viewer {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.expect("viewer connect");
    let join = serde_json::json!({ "type": "join", "namespace": namespace }).to_string();
    ws.send(Message::Text(join.into())).await.unwrap();

    match next_message(&mut ws).await {
        Message::Text(text) => {
            let reply: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(reply["type"], "joined");
            assert_eq!(reply["namespace"], namespace);
        }
        other => panic!("expected joined reply, got {other:?}"),
    }
    ws
}

async fn next_message(ws: &mut Viewer) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for viewer message")
        .expect("viewer stream ended")
        .expect("viewer stream error")
}

/// An event as seen by a viewer.
#[derive(Debug)]
pub enum Seen {
    Begin(Value),
    Data(CaptureId, Vec<u8>),
    End(Value),
}

impl Seen {
    pub fn capture_id(&self) -> String {
        match self {
            Seen::Begin(v) | Seen::End(v) => v["captureId"].as_str().unwrap().to_string(),
            Seen::Data(id, _) => id.to_string(),
        }
    }
}

pub async fn next_event(ws: &mut Viewer) -> Seen {
    loop {
        match next_message(ws).await {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                match value["type"].as_str() {
                    Some("begin") => return Seen::Begin(value),
                    Some("end") => return Seen::End(value),
                    other => panic!("unexpected text frame {other:?}"),
                }
            }
            Message::Binary(frame) => {
                let (id, chunk) = split_data_frame(&frame).expect("data frame");
                return Seen::Data(id, chunk.to_vec());
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message {other:?}"),
        }
    }
}

/// Read events until `ends` End events have been seen.
pub async fn collect_until_ends(ws: &mut Viewer, ends: usize) -> Vec<Seen> {
    let mut seen = Vec::new();
    let mut remaining = ends;
    while remaining > 0 {
        let event = next_event(ws).await;
        if matches!(event, Seen::End(_)) {
            remaining -= 1;
        }
        seen.push(event);
    }
    seen
}

/// Write raw bytes to the relay and read until it closes the connection.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    read_response(&mut stream).await
}

pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("timed out waiting for response")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Check that no further event is waiting for the viewer.
pub async fn assert_quiet(ws: &mut Viewer) {
    let next = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(next.is_err(), "unexpected viewer message: {next:?}");
}
