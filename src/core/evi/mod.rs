//! Streaming client for Hume's Empathic Voice Interface (EVI).
//!
//! EVI carries one bidirectional WebSocket stream per call: encoded audio
//! goes up as `audio_input` frames, synthesized audio and transcript events
//! come back as tagged JSON frames. This module splits that into three
//! concerns:
//!
//! - [`config`]: per-connection settings and the handshake URL builder
//! - [`messages`]: typed inbound/outbound frame definitions (the codec)
//! - [`transport`]: the connection itself — connect, framed send, close
//!
//! The transport never interprets frame contents; parsing and dispatch
//! happen in [`crate::core::bridge`].

pub mod config;
pub mod messages;
pub mod transport;

pub use config::EviConfig;
pub use messages::{
    AudioEncoding, AudioInput, ChatMetadata, EVI_DEFAULT_CHANNELS, EVI_DEFAULT_SAMPLE_RATE,
    EVI_WEBSOCKET_URL, EviClientMessage, EviServerMessage, ProsodyScores, SessionSettings,
    TextInput, deserialize_server_message, serialize_client_message,
};
pub use transport::{EviConnection, TransportEvent};
