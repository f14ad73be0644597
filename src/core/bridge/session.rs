//! Per-call session state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::warn;

use super::types::ConnectionInfo;
use crate::core::evi::EviConnection;

/// Engine-assigned identifiers for a session's chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatIds {
    /// Chat ID for this session.
    pub chat_id: String,
    /// Chat group ID for resuming conversations.
    pub chat_group_id: String,
}

/// One active bridge between a call and the engine.
///
/// The session exclusively owns its connection; teardown in the service is
/// the only place that closes it. Counters only grow until teardown, and the
/// activity flag flips to false exactly once.
#[derive(Debug)]
pub struct CallSession {
    call_id: String,
    connection: EviConnection,
    config_id: Option<String>,
    started_at: Instant,
    audio_frames_in: AtomicU64,
    audio_frames_out: AtomicU64,
    transcript_events: AtomicU64,
    active: AtomicBool,
    chat_ids: RwLock<Option<ChatIds>>,
}

impl CallSession {
    /// Create a session around a freshly opened connection.
    pub fn new(call_id: String, connection: EviConnection, config_id: Option<String>) -> Self {
        Self {
            call_id,
            connection,
            config_id,
            started_at: Instant::now(),
            audio_frames_in: AtomicU64::new(0),
            audio_frames_out: AtomicU64::new(0),
            transcript_events: AtomicU64::new(0),
            active: AtomicBool::new(true),
            chat_ids: RwLock::new(None),
        }
    }

    /// The call identifier this session is keyed by.
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// The session's connection handle.
    pub fn connection(&self) -> &EviConnection {
        &self.connection
    }

    /// True while the session is usable.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip the activity flag. Returns true for the caller that actually
    /// performed the transition, so teardown runs exactly once even when a
    /// peer close races an explicit end.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Record engine chat identifiers; first occurrence wins.
    pub fn record_chat_metadata(&self, chat_id: String, chat_group_id: String) {
        let mut guard = self.chat_ids.write();
        if let Some(existing) = guard.as_ref() {
            warn!(
                call_id = %self.call_id,
                recorded = %existing.chat_id,
                repeated = %chat_id,
                "Ignoring repeated chat metadata"
            );
            return;
        }
        *guard = Some(ChatIds {
            chat_id,
            chat_group_id,
        });
    }

    /// Engine chat identifiers, once metadata has arrived.
    pub fn chat_ids(&self) -> Option<ChatIds> {
        self.chat_ids.read().clone()
    }

    pub fn record_audio_in(&self) {
        self.audio_frames_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_out(&self) {
        self.audio_frames_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcript(&self) {
        self.transcript_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot for diagnostics.
    pub fn info(&self) -> ConnectionInfo {
        let chat_ids = self.chat_ids();
        ConnectionInfo {
            call_id: self.call_id.clone(),
            duration_ms: self.started_at.elapsed().as_millis() as u64,
            audio_frames_in: self.audio_frames_in.load(Ordering::Relaxed),
            audio_frames_out: self.audio_frames_out.load(Ordering::Relaxed),
            transcript_events: self.transcript_events.load(Ordering::Relaxed),
            active: self.is_active(),
            chat_id: chat_ids.as_ref().map(|c| c.chat_id.clone()),
            chat_group_id: chat_ids.map(|c| c.chat_group_id),
            config_id: self.config_id.clone(),
        }
    }
}
