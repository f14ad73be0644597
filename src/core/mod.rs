pub mod bridge;
pub mod evi;

// Re-export commonly used types for convenience
pub use bridge::{
    AudioChunk, CallBridge, CallHandlers, ConnectionInfo, SessionRegistry, SpeakerRole,
    StatsSnapshot, TranscriptEvent,
};

pub use evi::{
    AudioEncoding, EVI_DEFAULT_SAMPLE_RATE, EVI_WEBSOCKET_URL, EviClientMessage, EviConfig,
    EviConnection, EviServerMessage, ProsodyScores, TransportEvent,
};
