//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

/// Every handshake the mock upstream saw, as `path?query` strings.
pub type DialLog = Arc<Mutex<Vec<String>>>;

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub dials: DialLog,
}

impl MockUpstream {
    pub fn dialed(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }
}

/// Start a mock upstream serving WebSocket watch endpoints.
///
/// When `forbid_cluster_scope` is set, handshakes for paths without a
/// namespace segment are rejected with 403. Every accepted stream is
/// greeted with `frames` as text messages and then held open until the
/// peer goes away.
pub async fn start_mock_upstream(forbid_cluster_scope: bool, frames: Vec<String>) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dials: DialLog = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&dials);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let log = Arc::clone(&log);
            let frames = frames.clone();
            tokio::spawn(serve_watch(socket, log, forbid_cluster_scope, frames));
        }
    });

    MockUpstream { addr, dials }
}

async fn serve_watch(
    socket: TcpStream,
    log: DialLog,
    forbid_cluster_scope: bool,
    frames: Vec<String>,
) {
    let callback = move |request: &Request, response: Response| {
        let uri = request.uri().to_string();
        let namespaced = uri.contains("/namespaces/");
        log.lock().unwrap().push(uri);
        if forbid_cluster_scope && !namespaced {
            let mut reject = ErrorResponse::new(Some("Forbidden".to_owned()));
            *reject.status_mut() = StatusCode::FORBIDDEN;
            return Err(reject);
        }
        Ok(response)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
        return; // rejected or failed handshake
    };
    for frame in frames {
        if ws.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
    // hold the stream open until the proxy closes it
    while let Some(message) = ws.next().await {
        if message.is_err() {
            break;
        }
    }
}
