//! Collaborator-facing event types and callback signatures.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::evi::ProsodyScores;
use crate::errors::bridge_error::BridgeError;

/// One synthesized audio chunk from the engine.
///
/// The payload is the opaque encoded audio exactly as it arrived on the
/// stream; the bridge never transcodes it.
#[derive(Debug, Clone, Serialize)]
pub struct AudioChunk {
    /// Engine-assigned chunk ID, when present.
    pub id: Option<String>,
    /// Encoded audio payload, relayed verbatim.
    pub data: String,
}

/// Speaker role on a transcript event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// User speech transcript
    User,
    /// Assistant speech transcript
    Assistant,
}

impl fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeakerRole::User => write!(f, "user"),
            SpeakerRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A transcript event for one spoken turn, possibly partial.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    /// Who spoke.
    pub role: SpeakerRole,
    /// Transcript text.
    pub content: String,
    /// True for a partial (not yet final) user transcript.
    pub interim: bool,
    /// Emotion scores detected in the speech, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotions: Option<ProsodyScores>,
}

/// Callback for synthesized audio chunks.
pub type AudioCallback =
    Arc<dyn Fn(AudioChunk) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for transcript events.
pub type TranscriptCallback =
    Arc<dyn Fn(TranscriptEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for errors observed on a session.
pub type ErrorCallback =
    Arc<dyn Fn(BridgeError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The three callbacks a collaborator supplies when starting a conversation.
#[derive(Clone)]
pub struct CallHandlers {
    /// Invoked for every synthesized audio chunk.
    pub on_audio: AudioCallback,
    /// Invoked for every transcript event.
    pub on_transcript: TranscriptCallback,
    /// Invoked for engine errors, malformed frames, and transport failures.
    pub on_error: ErrorCallback,
}

impl CallHandlers {
    /// Build handlers from three closures.
    pub fn new(
        on_audio: AudioCallback,
        on_transcript: TranscriptCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            on_audio,
            on_transcript,
            on_error,
        }
    }
}

impl fmt::Debug for CallHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandlers").finish_non_exhaustive()
    }
}

/// Point-in-time snapshot of one session, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Call identifier.
    pub call_id: String,
    /// Milliseconds since the session started.
    pub duration_ms: u64,
    /// Audio frames pushed toward the engine.
    pub audio_frames_in: u64,
    /// Audio chunks relayed back to the caller.
    pub audio_frames_out: u64,
    /// Transcript events relayed.
    pub transcript_events: u64,
    /// True while the session is usable.
    pub active: bool,
    /// Engine-assigned chat ID, once metadata has arrived.
    pub chat_id: Option<String>,
    /// Engine-assigned chat group ID.
    pub chat_group_id: Option<String>,
    /// Configuration ID used to open the session.
    pub config_id: Option<String>,
}
