//! Scriptable mock EVI WebSocket server.
//!
//! Accepts connections on an ephemeral local port, records every handshake
//! URI and inbound client frame, and lets tests inject server frames (or a
//! close) into any connection by arrival order.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Shared state observed and scripted by tests.
pub struct MockEviState {
    /// Chat metadata sent automatically when a connection opens.
    metadata: Option<(String, String)>,
    /// Completed WebSocket handshakes.
    connections: AtomicUsize,
    /// Handshake request URIs, by connection order.
    request_uris: Mutex<Vec<String>>,
    /// Parsed client frames, across all connections.
    received: Mutex<Vec<Value>>,
    /// Frame-injection handles, by connection order.
    senders: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
}

pub struct MockEvi {
    addr: SocketAddr,
    state: Arc<MockEviState>,
    accept_task: JoinHandle<()>,
}

impl MockEvi {
    /// Start a server that greets every connection with `chat_metadata`.
    pub async fn start_with_metadata(chat_id: &str, chat_group_id: &str) -> Self {
        Self::start_inner(Some((chat_id.to_string(), chat_group_id.to_string()))).await
    }

    /// Start a server that sends nothing on its own.
    pub async fn start_silent() -> Self {
        Self::start_inner(None).await
    }

    async fn start_inner(metadata: Option<(String, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().expect("mock local addr");

        let state = Arc::new(MockEviState {
            metadata,
            connections: AtomicUsize::new(0),
            request_uris: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    /// WebSocket URL of the mock endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Number of completed handshakes so far.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Inject a JSON frame into connection `idx` (by arrival order).
    pub fn send_to(&self, idx: usize, frame: Value) {
        self.send_raw_to(idx, &frame.to_string());
    }

    /// Inject a raw text frame, valid JSON or not.
    pub fn send_raw_to(&self, idx: usize, text: &str) {
        let senders = self.state.senders.lock().unwrap();
        senders[idx]
            .send(Message::Text(text.to_string().into()))
            .expect("mock connection gone");
    }

    /// Close connection `idx` from the server side.
    pub fn close_connection(&self, idx: usize) {
        let senders = self.state.senders.lock().unwrap();
        let _ = senders[idx].send(Message::Close(None));
    }

    /// Parsed client frames received so far, across all connections.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    /// Handshake request URIs, by connection order.
    pub fn request_uris(&self) -> Vec<String> {
        self.state.request_uris.lock().unwrap().clone()
    }

    /// Stop accepting connections and release the port.
    pub fn stop(&self) {
        self.accept_task.abort();
    }
}

impl Drop for MockEvi {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockEviState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let uri_state = state.clone();
    let capture_uri = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        uri_state
            .request_uris
            .lock()
            .unwrap()
            .push(req.uri().to_string());
        Ok(resp)
    };

    let ws_stream = accept_hdr_async(stream, capture_uri).await?;
    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.senders.lock().unwrap().push(tx);
    state.connections.fetch_add(1, Ordering::SeqCst);

    if let Some((chat_id, chat_group_id)) = &state.metadata {
        let metadata = json!({
            "type": "chat_metadata",
            "chat_id": chat_id,
            "chat_group_id": chat_group_id,
        });
        write
            .send(Message::Text(metadata.to_string().into()))
            .await?;
    }

    loop {
        tokio::select! {
            injected = rx.recv() => {
                match injected {
                    Some(msg) => {
                        let closing = matches!(msg, Message::Close(_));
                        write.send(msg).await?;
                        if closing {
                            break;
                        }
                    }
                    None => break,
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            state.received.lock().unwrap().push(value);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    Ok(())
}
