//! Viewer WebSocket endpoint.
//!
//! # Data Flow
//! ```text
//! viewer ── {"type":"join"} ──▶ Subscriber::join ──▶ Hub
//! viewer ◀── begin / data / end frames ◀── subscriber queue ◀── Hub::publish
//! ```
//!
//! A viewer may join several namespaces over one socket. Leaving is implicit
//! when the socket closes. A viewer the hub evicted for falling behind gets a
//! close frame.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::http::server::AppState;
use crate::http::wire::{self, ViewerCommand, ViewerFrame};
use crate::hub::{Hub, Subscriber};

pub async fn viewer_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = Arc::clone(state.engine.hub());
    ws.on_upgrade(move |socket| run_viewer(socket, hub))
}

async fn run_viewer(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sink, mut stream) = socket.split();
    let (subscriber, mut events) = hub.subscriber();
    tracing::debug!(viewer = %subscriber.id(), "Viewer connected");

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let reply = match handle_command(&subscriber, text.as_str()).to_message() {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode viewer reply");
                            continue;
                        }
                    };
                    if sink.send(reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(viewer = %subscriber.id(), error = %e, "Viewer socket error");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => {
                    let message = match wire::encode_event(&event) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::error!(capture_id = %event.capture_id(), error = %e, "Failed to encode event");
                            continue;
                        }
                    };
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                None => {
                    tracing::warn!(viewer = %subscriber.id(), "Viewer evicted, closing socket");
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AGAIN,
                            reason: "viewer fell behind".into(),
                        })))
                        .await;
                    break;
                }
            },
        }
    }

    tracing::debug!(viewer = %subscriber.id(), "Viewer disconnected");
}

fn handle_command(subscriber: &Subscriber, text: &str) -> ViewerFrame<'static> {
    let command: ViewerCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            return ViewerFrame::Error {
                message: format!("invalid command: {e}"),
            }
        }
    };

    match command {
        ViewerCommand::Join { namespace } if namespace.is_empty() => ViewerFrame::Error {
            message: "namespace must not be empty".to_string(),
        },
        ViewerCommand::Join { namespace } => {
            if subscriber.join(&namespace) {
                tracing::debug!(viewer = %subscriber.id(), namespace = %namespace, "Viewer joined");
                ViewerFrame::Joined { namespace }
            } else {
                ViewerFrame::Error {
                    message: "viewer no longer registered".to_string(),
                }
            }
        }
        ViewerCommand::Leave { namespace } => {
            subscriber.leave(&namespace);
            ViewerFrame::Left { namespace }
        }
    }
}
