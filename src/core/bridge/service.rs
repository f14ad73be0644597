//! Session lifecycle controller.
//!
//! [`CallBridge`] owns the registry and the process-wide counters, opens one
//! engine connection per call, and runs one dispatch task per session that
//! routes inbound frames to the collaborator's callbacks.
//!
//! Per session the state machine is: Initializing (connect in flight; a
//! failure here is terminal and the session is never registered) → Active
//! (registered, counters bumped, frames flowing) → Terminated. Teardown —
//! close the connection, decrement the active count, drop the registry entry
//! — runs exactly once no matter whether a peer close, a transport error, or
//! an explicit [`CallBridge::end_conversation`] gets there first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::registry::SessionRegistry;
use super::session::CallSession;
use super::stats::{BridgeStats, StatsSnapshot};
use super::types::{AudioChunk, CallHandlers, ConnectionInfo, SpeakerRole, TranscriptEvent};
use crate::config::BridgeConfig;
use crate::core::evi::messages::{PauseAssistant, ResumeAssistant};
use crate::core::evi::{
    AudioInput, EviClientMessage, EviConnection, EviServerMessage, TextInput, TransportEvent,
    deserialize_server_message,
};
use crate::errors::bridge_error::{BridgeError, BridgeResult};

/// Bridges telephony call legs to the voice engine.
///
/// Explicitly constructed and passed by reference (`Arc`) to whatever hosts
/// it; one instance per process is the expected usage, but nothing here is a
/// hidden singleton. Lifecycle: [`CallBridge::new`] →
/// [`CallBridge::initialize`] → per-call operations →
/// [`CallBridge::shutdown`].
#[derive(Debug)]
pub struct CallBridge {
    config: BridgeConfig,
    registry: Arc<SessionRegistry>,
    stats: Arc<BridgeStats>,
    initialized: AtomicBool,
}

impl CallBridge {
    /// Create a bridge with no live sessions.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            stats: Arc::new(BridgeStats::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Resolve credentials and probe connectivity, then mark the bridge
    /// ready.
    ///
    /// The probe opens one connection, waits for the engine's opening frame
    /// within the configured deadline, and closes again. On failure nothing
    /// is left half-initialized: the readiness flag stays unset and no
    /// session state exists.
    pub async fn initialize(&self) -> BridgeResult<()> {
        let evi_config = self
            .config
            .evi_config()
            .map_err(|e| BridgeError::Init(e.to_string()))?;

        let (connection, mut events) = EviConnection::open(&evi_config)
            .await
            .map_err(|e| BridgeError::Init(e.to_string()))?;

        let probe_deadline = Duration::from_secs(evi_config.connect_timeout_secs);
        let probe = timeout(probe_deadline, events.recv()).await;
        connection.close();

        match probe {
            Ok(Some(TransportEvent::Frame(frame))) => {
                trace!("Probe handshake frame: {}", frame.chars().take(100).collect::<String>());
                self.initialized.store(true, Ordering::Release);
                info!("Bridge initialized, engine reachable");
                Ok(())
            }
            Ok(Some(TransportEvent::Error(e))) => {
                Err(BridgeError::Init(format!("connectivity probe failed: {e}")))
            }
            Ok(Some(TransportEvent::Closed)) | Ok(None) => Err(BridgeError::Init(
                "engine closed the connection during the probe".to_string(),
            )),
            Err(_) => Err(BridgeError::Init(format!(
                "no handshake frame within {}s",
                evi_config.connect_timeout_secs
            ))),
        }
    }

    /// Whether `initialize()` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Start bridging a call.
    ///
    /// Opens the engine connection, registers the session under `call_id`,
    /// and spawns its dispatch task. Safe to call concurrently for distinct
    /// call identifiers; a second start for a live call id fails with
    /// [`BridgeError::DuplicateSession`]. A connect failure surfaces
    /// synchronously and leaves nothing registered.
    pub async fn start_conversation(
        &self,
        call_id: impl Into<String>,
        handlers: CallHandlers,
    ) -> BridgeResult<()> {
        let call_id = call_id.into();

        if !self.is_initialized() {
            return Err(BridgeError::NotInitialized);
        }
        // Fast path; the registration below is the authoritative check.
        if self.registry.contains(&call_id) {
            return Err(BridgeError::DuplicateSession(call_id));
        }

        let evi_config = self.config.evi_config()?;
        let (connection, events) = EviConnection::open(&evi_config).await?;

        let session = Arc::new(CallSession::new(
            call_id.clone(),
            connection,
            evi_config.config_id.clone(),
        ));

        if let Err(e) = self.registry.register(session.clone()) {
            // Lost a registration race; this connection never served a session.
            session.connection().close();
            return Err(e);
        }

        self.stats.record_session_started();
        info!(call_id = %call_id, "Conversation started");

        let registry = self.registry.clone();
        let stats = self.stats.clone();
        tokio::spawn(dispatch_session(session, events, handlers, stats, registry));

        Ok(())
    }

    /// Forward one call audio frame to the engine. Fire-and-forget.
    pub fn send_audio(&self, call_id: &str, audio: Bytes) -> BridgeResult<()> {
        let session = self.active_session(call_id)?;
        session
            .connection()
            .send(EviClientMessage::AudioInput(AudioInput::from_bytes(&audio)))
            .map_err(|e| not_ready(call_id, e))?;
        session.record_audio_in();
        Ok(())
    }

    /// Inject a text message into the conversation. Fire-and-forget.
    pub fn send_text(&self, call_id: &str, text: &str) -> BridgeResult<()> {
        let session = self.active_session(call_id)?;
        session
            .connection()
            .send(EviClientMessage::TextInput(TextInput {
                text: text.to_string(),
            }))
            .map_err(|e| not_ready(call_id, e))
    }

    /// Pause assistant speech on a call.
    pub fn pause_assistant(&self, call_id: &str) -> BridgeResult<()> {
        let session = self.active_session(call_id)?;
        session
            .connection()
            .send(EviClientMessage::PauseAssistant(PauseAssistant::default()))
            .map_err(|e| not_ready(call_id, e))
    }

    /// Resume assistant speech on a call.
    pub fn resume_assistant(&self, call_id: &str) -> BridgeResult<()> {
        let session = self.active_session(call_id)?;
        session
            .connection()
            .send(EviClientMessage::ResumeAssistant(ResumeAssistant::default()))
            .map_err(|e| not_ready(call_id, e))
    }

    /// End a conversation. No-op for unknown call identifiers; safe from any
    /// task and never blocks on in-flight sends.
    pub fn end_conversation(&self, call_id: &str) {
        match self.registry.lookup(call_id) {
            Some(session) => teardown(&session, &self.registry, &self.stats),
            None => debug!(call_id = %call_id, "End requested for unknown call"),
        }
    }

    /// Tear down every live session.
    pub fn shutdown(&self) {
        let call_ids = self.registry.call_ids();
        if !call_ids.is_empty() {
            info!(sessions = call_ids.len(), "Shutting down bridge");
        }
        for call_id in call_ids {
            self.end_conversation(&call_id);
        }
        self.initialized.store(false, Ordering::Release);
    }

    /// Snapshot the process-wide counters.
    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.registry.len(), self.is_initialized())
    }

    /// Snapshot one session, or `None` when the call is unknown.
    pub fn get_connection_info(&self, call_id: &str) -> Option<ConnectionInfo> {
        self.registry.lookup(call_id).map(|session| session.info())
    }

    fn active_session(&self, call_id: &str) -> BridgeResult<Arc<CallSession>> {
        let session = self
            .registry
            .lookup(call_id)
            .ok_or_else(|| BridgeError::NoActiveSession(call_id.to_string()))?;
        if !session.is_active() {
            return Err(BridgeError::NoActiveSession(call_id.to_string()));
        }
        Ok(session)
    }
}

/// A transport-level send failure means the connection under a still-registered
/// session is no longer open; surface that as the session-level error.
fn not_ready(call_id: &str, e: BridgeError) -> BridgeError {
    match e {
        BridgeError::Send(_) => BridgeError::TransportNotReady(call_id.to_string()),
        other => other,
    }
}

/// Tear a session down exactly once.
///
/// Guarded by the session's activity flag: only the caller that flips it
/// closes the connection, decrements the active count, and removes the
/// registry entry. Racing a peer close against an explicit end is safe.
fn teardown(session: &Arc<CallSession>, registry: &SessionRegistry, stats: &BridgeStats) {
    if session.deactivate() {
        session.connection().close();
        stats.record_session_ended();
        registry.remove(session.call_id());
        info!(call_id = %session.call_id(), "Session torn down");
    }
}

/// Per-session dispatch loop.
///
/// Single consumer of the connection's event channel, so one session's
/// frames are handled strictly in arrival order. Ends with teardown when the
/// transport closes.
async fn dispatch_session(
    session: Arc<CallSession>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    handlers: CallHandlers,
    stats: Arc<BridgeStats>,
    registry: Arc<SessionRegistry>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Frame(frame) => {
                dispatch_frame(&session, &frame, &handlers, &stats).await;
            }
            TransportEvent::Error(e) => {
                warn!(call_id = %session.call_id(), "Transport error: {e}");
                (handlers.on_error)(BridgeError::Transport(e)).await;
                // Closed follows; teardown happens on the way out.
            }
            TransportEvent::Closed => break,
        }
    }

    teardown(&session, &registry, &stats);
}

/// Route one inbound frame.
///
/// A malformed frame is reported and dropped; it never terminates the loop
/// and leaves every counter untouched.
async fn dispatch_frame(
    session: &Arc<CallSession>,
    frame: &str,
    handlers: &CallHandlers,
    stats: &BridgeStats,
) {
    let msg = match deserialize_server_message(frame) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(call_id = %session.call_id(), "Malformed frame: {e}");
            (handlers.on_error)(BridgeError::Codec(e.to_string())).await;
            return;
        }
    };

    match msg {
        EviServerMessage::ChatMetadata(meta) => {
            info!(
                call_id = %session.call_id(),
                chat_id = %meta.chat_id,
                chat_group_id = %meta.chat_group_id,
                "Chat metadata received"
            );
            session.record_chat_metadata(meta.chat_id, meta.chat_group_id);
        }

        EviServerMessage::AudioOutput(output) => {
            session.record_audio_out();
            stats.record_audio_message();
            (handlers.on_audio)(AudioChunk {
                id: output.id,
                data: output.data,
            })
            .await;
        }

        EviServerMessage::UserMessage(user_msg) => {
            debug!(
                call_id = %session.call_id(),
                interim = ?user_msg.interim,
                "User transcript: {}",
                user_msg.message.content
            );
            session.record_transcript();
            (handlers.on_transcript)(TranscriptEvent {
                role: SpeakerRole::User,
                content: user_msg.message.content,
                interim: user_msg.interim.unwrap_or(false),
                emotions: user_msg.models.and_then(|m| m.prosody).map(|p| p.scores),
            })
            .await;
        }

        EviServerMessage::AssistantMessage(asst_msg) => {
            debug!(
                call_id = %session.call_id(),
                "Assistant transcript: {}",
                asst_msg.message.content
            );
            session.record_transcript();
            (handlers.on_transcript)(TranscriptEvent {
                role: SpeakerRole::Assistant,
                content: asst_msg.message.content,
                interim: false,
                emotions: asst_msg.models.and_then(|m| m.prosody).map(|p| p.scores),
            })
            .await;
        }

        EviServerMessage::UserInterruption(interruption) => {
            // The engine handles barge-in itself; observers just get a log line.
            debug!(
                call_id = %session.call_id(),
                time = ?interruption.time,
                "User interruption"
            );
        }

        EviServerMessage::AssistantEnd(end) => {
            debug!(call_id = %session.call_id(), id = ?end.id, "Assistant turn ended");
        }

        EviServerMessage::Error(err) => {
            warn!(
                call_id = %session.call_id(),
                code = ?err.code,
                "Engine error: {}",
                err.message
            );
            stats.record_error();
            (handlers.on_error)(BridgeError::Engine {
                code: err.code,
                message: err.message,
            })
            .await;
        }

        EviServerMessage::Unknown => {
            trace!(call_id = %session.call_id(), "Ignoring unknown frame type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn noop_handlers() -> CallHandlers {
        CallHandlers::new(
            Arc::new(|_| Box::pin(async {})),
            Arc::new(|_| Box::pin(async {})),
            Arc::new(|_| Box::pin(async {})),
        )
    }

    fn stub_session(call_id: &str) -> Arc<CallSession> {
        let (connection, _events, _outbound) = EviConnection::stub();
        Arc::new(CallSession::new(call_id.to_string(), connection, None))
    }

    #[tokio::test]
    async fn test_start_requires_initialize() {
        let bridge = CallBridge::new(BridgeConfig::new("key"));
        let result = bridge.start_conversation("call-1", noop_handlers()).await;
        assert!(matches!(result, Err(BridgeError::NotInitialized)));
    }

    #[test]
    fn test_send_audio_unknown_call() {
        let bridge = CallBridge::new(BridgeConfig::new("key"));
        let result = bridge.send_audio("nope", Bytes::from_static(b"abc"));
        assert!(matches!(result, Err(BridgeError::NoActiveSession(_))));
    }

    #[test]
    fn test_send_text_unknown_call() {
        let bridge = CallBridge::new(BridgeConfig::new("key"));
        let result = bridge.send_text("nope", "hello");
        assert!(matches!(result, Err(BridgeError::NoActiveSession(_))));
    }

    #[test]
    fn test_end_conversation_unknown_is_noop() {
        let bridge = CallBridge::new(BridgeConfig::new("key"));
        bridge.end_conversation("nope");
        assert_eq!(bridge.get_stats().active_conversations, 0);
    }

    #[test]
    fn test_connection_info_unknown_is_none() {
        let bridge = CallBridge::new(BridgeConfig::new("key"));
        assert!(bridge.get_connection_info("nope").is_none());
    }

    #[test]
    fn test_initial_stats() {
        let bridge = CallBridge::new(BridgeConfig::new("key"));
        let stats = bridge.get_stats();
        assert_eq!(stats.total_conversations, 0);
        assert_eq!(stats.active_conversations, 0);
        assert_eq!(stats.active_connections, 0);
        assert!(!stats.initialized);
    }

    #[test]
    fn test_send_error_maps_to_transport_not_ready() {
        let mapped = not_ready("call-1", BridgeError::Send("closed".to_string()));
        assert!(matches!(mapped, BridgeError::TransportNotReady(id) if id == "call-1"));

        let passthrough = not_ready("call-1", BridgeError::Timeout("t".to_string()));
        assert!(matches!(passthrough, BridgeError::Timeout(_)));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let registry = SessionRegistry::new();
        let stats = BridgeStats::new();
        let session = stub_session("call-1");

        registry.register(session.clone()).unwrap();
        stats.record_session_started();

        teardown(&session, &registry, &stats);
        teardown(&session, &registry, &stats);

        assert_eq!(stats.active_conversations(), 0);
        assert!(registry.is_empty());
        assert!(!session.is_active());
        assert!(!session.connection().is_open());
    }

    #[tokio::test]
    async fn test_dispatch_metadata_first_wins() {
        let session = stub_session("call-1");
        let stats = BridgeStats::new();
        let handlers = noop_handlers();

        dispatch_frame(
            &session,
            r#"{"type":"chat_metadata","chat_id":"abc","chat_group_id":"grp1"}"#,
            &handlers,
            &stats,
        )
        .await;
        dispatch_frame(
            &session,
            r#"{"type":"chat_metadata","chat_id":"zzz","chat_group_id":"grp9"}"#,
            &handlers,
            &stats,
        )
        .await;

        let ids = session.chat_ids().unwrap();
        assert_eq!(ids.chat_id, "abc");
        assert_eq!(ids.chat_group_id, "grp1");
    }

    #[tokio::test]
    async fn test_dispatch_audio_output_counts_and_forwards() {
        let session = stub_session("call-1");
        let stats = BridgeStats::new();

        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = received.clone();
        let handlers = CallHandlers::new(
            Arc::new(move |chunk: AudioChunk| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().push(chunk.data);
                })
            }),
            Arc::new(|_| Box::pin(async {})),
            Arc::new(|_| Box::pin(async {})),
        );

        dispatch_frame(
            &session,
            r#"{"type":"audio_output","id":"a1","data":"QUJD"}"#,
            &handlers,
            &stats,
        )
        .await;

        assert_eq!(*received.lock(), ["QUJD"]);
        assert_eq!(stats.snapshot(0, true).total_audio_messages, 1);
        assert_eq!(session.info().audio_frames_out, 1);
    }

    #[tokio::test]
    async fn test_dispatch_malformed_frame_reports_without_counting() {
        let session = stub_session("call-1");
        let stats = BridgeStats::new();

        let errors = Arc::new(AtomicU64::new(0));
        let seen = errors.clone();
        let handlers = CallHandlers::new(
            Arc::new(|_| Box::pin(async {})),
            Arc::new(|_| Box::pin(async {})),
            Arc::new(move |_err| {
                let seen = seen.clone();
                Box::pin(async move {
                    seen.fetch_add(1, Ordering::Relaxed);
                })
            }),
        );

        dispatch_frame(&session, "{ not json", &handlers, &stats).await;

        assert_eq!(errors.load(Ordering::Relaxed), 1);
        // A malformed frame must not touch the counters or the session.
        assert_eq!(stats.snapshot(0, true).errors, 0);
        assert!(session.is_active());
        assert_eq!(session.info().audio_frames_out, 0);
    }

    #[tokio::test]
    async fn test_dispatch_engine_error_counts() {
        let session = stub_session("call-1");
        let stats = BridgeStats::new();

        let messages = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = messages.clone();
        let handlers = CallHandlers::new(
            Arc::new(|_| Box::pin(async {})),
            Arc::new(|_| Box::pin(async {})),
            Arc::new(move |err: BridgeError| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().push(err.to_string());
                })
            }),
        );

        dispatch_frame(
            &session,
            r#"{"type":"error","message":"boom"}"#,
            &handlers,
            &stats,
        )
        .await;

        assert_eq!(stats.snapshot(0, true).errors, 1);
        assert_eq!(*messages.lock(), ["Engine error: boom"]);
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_dispatch_interim_flag_passes_through() {
        let session = stub_session("call-1");
        let stats = BridgeStats::new();

        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        let handlers = CallHandlers::new(
            Arc::new(|_| Box::pin(async {})),
            Arc::new(move |event: TranscriptEvent| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().push((event.role, event.interim, event.content));
                })
            }),
            Arc::new(|_| Box::pin(async {})),
        );

        dispatch_frame(
            &session,
            r#"{"type":"user_message","message":{"role":"user","content":"hel"},"interim":true}"#,
            &handlers,
            &stats,
        )
        .await;
        dispatch_frame(
            &session,
            r#"{"type":"assistant_message","message":{"role":"assistant","content":"hi"}}"#,
            &handlers,
            &stats,
        )
        .await;

        let seen = events.lock();
        assert_eq!(seen[0], (SpeakerRole::User, true, "hel".to_string()));
        assert_eq!(seen[1], (SpeakerRole::Assistant, false, "hi".to_string()));
        assert_eq!(session.info().transcript_events, 2);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_and_informational_frames_ignored() {
        let session = stub_session("call-1");
        let stats = BridgeStats::new();
        let handlers = noop_handlers();

        for frame in [
            r#"{"type":"assistant_end","id":"m1"}"#,
            r#"{"type":"user_interruption","time":1234}"#,
            r#"{"type":"brand_new_thing","payload":{}}"#,
        ] {
            dispatch_frame(&session, frame, &handlers, &stats).await;
        }

        let snap = stats.snapshot(0, true);
        assert_eq!(snap.errors, 0);
        assert_eq!(snap.total_audio_messages, 0);
        assert_eq!(session.info().transcript_events, 0);
        assert!(session.is_active());
    }
}
