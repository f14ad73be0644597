pub mod config;
pub mod core;
pub mod errors;

// Re-export commonly used items for convenience
pub use config::BridgeConfig;
pub use core::bridge::{
    AudioChunk, CallBridge, CallHandlers, ConnectionInfo, SpeakerRole, StatsSnapshot,
    TranscriptEvent,
};
pub use errors::bridge_error::{BridgeError, BridgeResult};
