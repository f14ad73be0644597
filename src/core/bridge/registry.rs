//! Concurrent call-id → session registry.
//!
//! Uses DashMap for O(1) concurrent access; every operation is safe to call
//! from any session's event-handling path.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::session::CallSession;
use crate::errors::bridge_error::{BridgeError, BridgeResult};

/// Process-wide mapping from call identifier to live session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<CallSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session keyed by its call identifier.
    ///
    /// Atomic: of two racing registrations for the same call id, exactly one
    /// wins and the other gets [`BridgeError::DuplicateSession`].
    pub fn register(&self, session: Arc<CallSession>) -> BridgeResult<()> {
        match self.sessions.entry(session.call_id().to_string()) {
            Entry::Occupied(_) => Err(BridgeError::DuplicateSession(
                session.call_id().to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Look up a live session.
    pub fn lookup(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_id).map(|entry| entry.value().clone())
    }

    /// True if a session exists for the call identifier.
    pub fn contains(&self, call_id: &str) -> bool {
        self.sessions.contains_key(call_id)
    }

    /// Remove a session. Idempotent; returns the session if one was present.
    pub fn remove(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.remove(call_id).map(|(_, session)| session)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Call identifiers of every registered session.
    pub fn call_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}
