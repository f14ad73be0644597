//! EVI streaming transport.
//!
//! Opens one WebSocket connection per call session and pumps frames in both
//! directions. The transport is deliberately dumb: outbound messages are
//! serialized and written, inbound text frames are surfaced verbatim as
//! [`TransportEvent::Frame`]s on a single-consumer channel, preserving
//! arrival order for the session that owns the connection. Parsing happens
//! downstream in the bridge dispatcher.
//!
//! Closing is cancellation-based: [`EviConnection::close`] fires a
//! `CancellationToken`, the pump task sends a best-effort close frame and
//! exits, and a final [`TransportEvent::Closed`] is emitted. Calling `close`
//! twice is a no-op.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::EviConfig;
use super::messages::{EviClientMessage, serialize_client_message};
use crate::errors::bridge_error::{BridgeError, BridgeResult};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Events surfaced by the transport to the connection's single consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One inbound text frame, uninterpreted.
    Frame(String),
    /// The socket failed; `Closed` follows.
    Error(String),
    /// The socket ended (peer close, failure, or local close). Emitted
    /// exactly once, as the final event.
    Closed,
}

/// Handle to one open EVI connection.
///
/// The owning session is the only entity permitted to close it; dropping the
/// handle cancels the pump task as well.
#[derive(Debug)]
pub struct EviConnection {
    outbound: mpsc::UnboundedSender<EviClientMessage>,
    cancel: CancellationToken,
}

impl EviConnection {
    /// Open a connection to the engine.
    ///
    /// Builds the handshake URL from `config` (credentials as query
    /// parameters), dials with the configured timeout, and spawns the pump
    /// task. Returns the connection handle plus the event receiver carrying
    /// this connection's inbound frames in arrival order.
    ///
    /// When the configured audio format deviates from engine defaults, a
    /// `session_settings` frame is queued before the caller can send
    /// anything else.
    pub async fn open(
        config: &EviConfig,
    ) -> BridgeResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        config.validate()?;

        let url = config.build_websocket_url();
        debug!(
            endpoint = url.split('?').next().unwrap_or(&url),
            "Connecting to EVI"
        );

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let connect_result = timeout(connect_timeout, connect_async(&url)).await;

        let (ws_stream, response) = match connect_result {
            Ok(Ok((stream, response))) => (stream, response),
            Ok(Err(e)) => {
                return Err(BridgeError::Connect(format!(
                    "WebSocket connection failed: {e}"
                )));
            }
            Err(_) => {
                return Err(BridgeError::Timeout(format!(
                    "Connection attempt exceeded {}s",
                    config.connect_timeout_secs
                )));
            }
        };

        info!(status = %response.status(), "Connected to EVI");

        let (ws_write, ws_read) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(pump(
            ws_write,
            ws_read,
            outbound_rx,
            event_tx,
            cancel.clone(),
        ));

        let connection = Self {
            outbound: outbound_tx,
            cancel,
        };

        if config.needs_session_settings() {
            connection.send(EviClientMessage::SessionSettings(config_session_settings(
                config,
            )))?;
        }

        Ok((connection, event_rx))
    }

    /// Queue an outbound frame.
    ///
    /// Non-blocking. Fails with [`BridgeError::Send`] once the connection has
    /// been closed; a send after close is surfaced, never silently dropped.
    pub fn send(&self, msg: EviClientMessage) -> BridgeResult<()> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::Send("connection is closed".to_string()));
        }
        self.outbound
            .send(msg)
            .map_err(|_| BridgeError::Send("connection is closed".to_string()))
    }

    /// Close the connection. Idempotent; never blocks on in-flight sends.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the connection is still open for sends.
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.outbound.is_closed()
    }
}

impl Drop for EviConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
impl EviConnection {
    /// Build a connection with no socket behind it, for state-machine tests.
    /// The returned receivers play the socket side: queued frames land on the
    /// outbound receiver, and the event receiver stands in for inbound events.
    pub(crate) fn stub() -> (
        Self,
        mpsc::UnboundedReceiver<TransportEvent>,
        mpsc::UnboundedReceiver<EviClientMessage>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: outbound_tx,
                cancel: CancellationToken::new(),
            },
            event_rx,
            outbound_rx,
        )
    }
}

fn config_session_settings(config: &EviConfig) -> super::messages::SessionSettings {
    super::messages::SessionSettings {
        audio: Some(super::messages::AudioSettings {
            encoding: config.input_encoding,
            sample_rate: Some(config.sample_rate),
            channels: Some(config.channels),
        }),
        system_prompt: config.system_prompt.clone(),
    }
}

/// Pump loop owning both halves of the socket.
///
/// Runs until the peer closes, the socket errors, or the cancellation token
/// fires. Emits `Closed` exactly once on the way out.
async fn pump(
    mut ws_write: WsSink,
    mut ws_read: WsSource,
    mut outbound_rx: mpsc::UnboundedReceiver<EviClientMessage>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Transport close requested");
                let _ = ws_write.send(Message::Close(None)).await;
                break;
            }

            maybe_msg = outbound_rx.recv() => {
                match maybe_msg {
                    Some(msg) => match serialize_client_message(&msg) {
                        Ok(json) => {
                            trace!("Sending frame: {}", json.chars().take(100).collect::<String>());
                            if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                error!("Failed to send WebSocket message: {e}");
                                let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize outbound frame: {e}");
                        }
                    },
                    // All senders dropped; nothing left to write.
                    None => break,
                }
            }

            maybe_frame = ws_read.next() => {
                match maybe_frame {
                    Some(Ok(Message::Text(text))) => {
                        trace!("Received frame: {}", text.chars().take(100).collect::<String>());
                        if event_tx.send(TransportEvent::Frame(text.to_string())).is_err() {
                            // Consumer gone; tearing down.
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "EVI closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    cancel.cancel();
    let _ = event_tx.send(TransportEvent::Closed);
    debug!("Transport pump ended");
}
