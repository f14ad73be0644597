//! Call bridge: session lifecycle, registry, and dispatch.
//!
//! This is the collaborator-facing surface. A host hands
//! [`CallBridge::start_conversation`] a call identifier and three callbacks
//! (audio, transcript, error); the bridge opens the engine stream, registers
//! the session, and routes engine events to the callbacks until the call
//! ends — by an explicit [`CallBridge::end_conversation`] or a peer close,
//! whichever comes first.
//!
//! # Ordering
//!
//! Each session's events are dispatched by a single task consuming that
//! connection's event channel, so a session always observes its own events
//! in arrival order. Sessions are independent and run concurrently.

pub mod registry;
pub mod service;
pub mod session;
pub mod stats;
pub mod types;

pub use registry::SessionRegistry;
pub use service::CallBridge;
pub use session::{CallSession, ChatIds};
pub use stats::{BridgeStats, StatsSnapshot};
pub use types::{
    AudioCallback, AudioChunk, CallHandlers, ConnectionInfo, ErrorCallback, SpeakerRole,
    TranscriptCallback, TranscriptEvent,
};
