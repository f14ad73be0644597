//! Error taxonomy for the call bridge.
//!
//! One variant per failure class so callers can match on the outcome of an
//! operation instead of inspecting strings. Connection-probe and credential
//! problems are fatal to `initialize()`; per-session failures never affect
//! other sessions or terminate the process.

use thiserror::Error;

/// Errors that can occur while bridging a call to the voice engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Initialization failed (missing credentials or failed connectivity probe)
    #[error("Initialization failed: {0}")]
    Init(String),

    /// An operation was attempted before `initialize()` succeeded
    #[error("Bridge not initialized")]
    NotInitialized,

    /// Opening the streaming connection failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// An operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A session is already active for the call identifier
    #[error("Session already active for call {0}")]
    DuplicateSession(String),

    /// No active session exists for the call identifier
    #[error("No active session for call {0}")]
    NoActiveSession(String),

    /// The session exists but its connection is not open
    #[error("Transport not ready for call {0}")]
    TransportNotReady(String),

    /// Enqueueing an outbound frame failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The streaming connection failed mid-session
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be parsed
    #[error("Malformed frame: {0}")]
    Codec(String),

    /// The engine reported an error over the stream
    #[error("Engine error: {message}")]
    Engine {
        /// Engine-supplied error code, when present
        code: Option<String>,
        /// Engine-supplied error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Connect("refused".to_string());
        assert!(err.to_string().contains("Connection failed"));

        let err = BridgeError::NotInitialized;
        assert_eq!(err.to_string(), "Bridge not initialized");

        let err = BridgeError::DuplicateSession("call-1".to_string());
        assert!(err.to_string().contains("call-1"));
    }

    #[test]
    fn test_engine_error_display() {
        let err = BridgeError::Engine {
            code: Some("E0101".to_string()),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Engine error: boom");
    }
}
