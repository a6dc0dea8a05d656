use thiserror::Error;

use crate::types::ConnectionState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Handshake failed: {reason}")]
    HandshakeFailure { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    #[error("Probe unreachable: {reason}")]
    ProbeUnreachable { reason: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error("Connect cancelled by disconnect")]
    Cancelled,

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },
}

impl SessionError {
    /// Errors that end the session (state becomes `Failed`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::HandshakeFailure { .. } | Self::Transport(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_and_transport_errors_are_terminal() {
        assert!(SessionError::HandshakeFailure { reason: "refused".into() }.is_terminal());
        assert!(SessionError::from(TransportError::ConnectionClosed).is_terminal());
        assert!(!SessionError::NotConnected { state: ConnectionState::Idle }.is_terminal());
        assert!(!SessionError::ProbeUnreachable { reason: "timeout".into() }.is_terminal());
    }

    #[test]
    fn not_connected_message_names_the_state() {
        let err = SessionError::NotConnected { state: ConnectionState::Closed };
        assert_eq!(err.to_string(), "Not connected (state: closed)");
    }
}
