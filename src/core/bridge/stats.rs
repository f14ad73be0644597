//! Process-wide bridge counters.
//!
//! Lock-free diagnostics shared by every session. Nothing here drives
//! control flow; values are best-effort and only `active_conversations`
//! ever decreases (on teardown).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Aggregate counters across all sessions.
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Sessions ever started.
    total_conversations: AtomicU64,
    /// Sessions currently live.
    active_conversations: AtomicU64,
    /// Audio chunks relayed from the engine, across all sessions.
    total_audio_messages: AtomicU64,
    /// Errors observed (engine-reported).
    errors: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session entering the active state.
    pub fn record_session_started(&self) {
        self.total_conversations.fetch_add(1, Ordering::Relaxed);
        self.active_conversations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session teardown. The caller guarantees exactly-once.
    pub fn record_session_ended(&self) {
        self.active_conversations.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record one relayed audio chunk.
    pub fn record_audio_message(&self) {
        self.total_audio_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one observed error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_conversations(&self) -> u64 {
        self.active_conversations.load(Ordering::Relaxed)
    }

    /// Snapshot the counters, annotated with registry size and readiness.
    pub fn snapshot(&self, active_connections: usize, initialized: bool) -> StatsSnapshot {
        StatsSnapshot {
            total_conversations: self.total_conversations.load(Ordering::Relaxed),
            active_conversations: self.active_conversations.load(Ordering::Relaxed),
            total_audio_messages: self.total_audio_messages.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            active_connections,
            initialized,
        }
    }
}

/// Point-in-time view of the bridge counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Sessions ever started.
    pub total_conversations: u64,
    /// Sessions currently live.
    pub active_conversations: u64,
    /// Audio chunks relayed from the engine.
    pub total_audio_messages: u64,
    /// Errors observed.
    pub errors: u64,
    /// Sessions currently in the registry.
    pub active_connections: usize,
    /// Whether `initialize()` has succeeded.
    pub initialized: bool,
}
