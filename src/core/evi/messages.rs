//! EVI WebSocket message types.
//!
//! Every frame on the stream is a JSON object tagged by `type`. Inbound
//! frames deserialize into [`EviServerMessage`]; unrecognized tags fall into
//! the [`EviServerMessage::Unknown`] arm so a new engine message type never
//! breaks the dispatch loop. Outbound frames serialize from
//! [`EviClientMessage`].
//!
//! # Message Flow
//!
//! ```text
//! Client → Server:
//!   - SessionSettings (declare audio format, system prompt)
//!   - AudioInput (base64-encoded audio chunks)
//!   - TextInput (text messages)
//!   - PauseAssistant / ResumeAssistant
//!
//! Server → Client:
//!   - ChatMetadata (on connection)
//!   - UserMessage (transcription + prosody)
//!   - AssistantMessage (response text)
//!   - AudioOutput (response audio)
//!   - UserInterruption (barge-in notification)
//!   - AssistantEnd (response complete)
//!   - Error (error occurred)
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Constants
// =============================================================================

/// Hume EVI WebSocket endpoint URL.
pub const EVI_WEBSOCKET_URL: &str = "wss://api.hume.ai/v0/evi/chat";

/// Sample rate EVI assumes when no session settings are sent (Hz).
pub const EVI_DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default number of audio channels (mono).
pub const EVI_DEFAULT_CHANNELS: u8 = 1;

// =============================================================================
// Prosody Scores
// =============================================================================

/// Emotion scores attached to a transcript, keyed by emotion name.
///
/// The engine reports a confidence per perceived emotion dimension. The set
/// of dimensions is engine-defined and may grow, so scores are carried as an
/// open map rather than a fixed struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProsodyScores(pub BTreeMap<String, f32>);

impl ProsodyScores {
    /// Get the top N emotions by score, highest first.
    pub fn top_emotions(&self, n: usize) -> Vec<(&str, f32)> {
        let mut scores: Vec<(&str, f32)> =
            self.0.iter().map(|(name, score)| (name.as_str(), *score)).collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(n);
        scores
    }

    /// Get the dominant emotion (highest score).
    pub fn dominant_emotion(&self) -> Option<(&str, f32)> {
        self.top_emotions(1).into_iter().next()
    }
}

// =============================================================================
// Client → Server Messages
// =============================================================================

/// Messages sent from the bridge to the EVI server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EviClientMessage {
    /// Declare session settings (audio format, system prompt).
    SessionSettings(SessionSettings),
    /// Send one encoded audio chunk.
    AudioInput(AudioInput),
    /// Send a text message into the conversation.
    TextInput(TextInput),
    /// Pause assistant speech.
    PauseAssistant(PauseAssistant),
    /// Resume assistant speech.
    ResumeAssistant(ResumeAssistant),
}

/// Session settings declaring the input audio format.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSettings {
    /// Audio format settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSettings>,
    /// System prompt override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Audio format settings.
#[derive(Debug, Clone, Serialize)]
pub struct AudioSettings {
    /// Encoding format.
    pub encoding: AudioEncoding,
    /// Sample rate in Hz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Number of channels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
}

/// Supported audio encodings for EVI input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// Linear 16-bit PCM, little-endian.
    #[default]
    Linear16,
    /// WebM container format.
    Webm,
}

/// Audio input frame wrapping base64-encoded audio.
#[derive(Debug, Clone, Serialize)]
pub struct AudioInput {
    /// Base64-encoded audio data.
    pub data: String,
}

impl AudioInput {
    /// Create an AudioInput from raw audio bytes.
    pub fn from_bytes(audio_data: &[u8]) -> Self {
        Self {
            data: BASE64.encode(audio_data),
        }
    }
}

/// Text input frame.
#[derive(Debug, Clone, Serialize)]
pub struct TextInput {
    /// Text content.
    pub text: String,
}

/// Pause assistant speech.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PauseAssistant {}

/// Resume assistant speech.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResumeAssistant {}

// =============================================================================
// Server → Client Messages
// =============================================================================

/// Messages received from the EVI server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EviServerMessage {
    /// Chat metadata, sent once on connection.
    ChatMetadata(ChatMetadata),
    /// User speech transcript with prosody scores.
    UserMessage(UserMessage),
    /// Assistant response text.
    AssistantMessage(AssistantMessage),
    /// Synthesized audio chunk.
    AudioOutput(AudioOutput),
    /// The user spoke over the assistant.
    UserInterruption(UserInterruption),
    /// End of an assistant turn.
    AssistantEnd(AssistantEnd),
    /// Engine-reported error.
    Error(EngineError),
    /// Unknown message type (forward compatibility).
    #[serde(other)]
    Unknown,
}

/// Chat metadata received when the stream opens.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMetadata {
    /// Chat ID for this session.
    pub chat_id: String,
    /// Chat group ID for resuming conversations.
    pub chat_group_id: String,
    /// Request ID.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// User transcript with optional prosody scores.
#[derive(Debug, Clone, Deserialize)]
pub struct UserMessage {
    /// Message ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Transcript content.
    pub message: ChatMessageContent,
    /// Prosody model output, when available.
    #[serde(default)]
    pub models: Option<ProsodyModels>,
    /// True for a partial (not yet final) transcript.
    #[serde(default)]
    pub interim: Option<bool>,
}

/// Assistant response text.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    /// Message ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Response content.
    pub message: ChatMessageContent,
    /// Prosody model output, when available.
    #[serde(default)]
    pub models: Option<ProsodyModels>,
}

/// Role and text of a chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageContent {
    /// Speaker role (`user` or `assistant`).
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Prosody models container.
#[derive(Debug, Clone, Deserialize)]
pub struct ProsodyModels {
    /// Prosody output.
    #[serde(default)]
    pub prosody: Option<ProsodyData>,
}

/// Prosody data container.
#[derive(Debug, Clone, Deserialize)]
pub struct ProsodyData {
    /// Emotion scores.
    pub scores: ProsodyScores,
}

/// Synthesized audio chunk. The payload stays base64-encoded; the bridge
/// relays it verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioOutput {
    /// Chunk ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Base64-encoded audio data.
    pub data: String,
}

impl AudioOutput {
    /// Decode the audio payload to raw bytes.
    pub fn decode_audio(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data)
    }
}

/// User interruption event.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInterruption {
    /// Interruption time in milliseconds.
    #[serde(default)]
    pub time: Option<u64>,
}

/// End of an assistant turn.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantEnd {
    /// Message ID.
    #[serde(default)]
    pub id: Option<String>,
}

/// Engine-reported error frame.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineError {
    /// Error code, when supplied.
    #[serde(default)]
    pub code: Option<String>,
    /// Error message.
    pub message: String,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Serialize a client message to JSON.
pub fn serialize_client_message(msg: &EviClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Deserialize a server message from JSON.
pub fn deserialize_server_message(json: &str) -> Result<EviServerMessage, serde_json::Error> {
    serde_json::from_str(json)
}

// =============================================================================
// Tests
// =============================================================================
