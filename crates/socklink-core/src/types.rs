use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::errors::{SessionError, TransportError};

// MARK: - ConnectionState

/// Lifecycle state of the single logical connection a session manages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Closing,
    Closed,
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// A transport is open (or being opened) for the current session.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Closing)
    }

    /// States from which `connect` may start a new session.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Failed(_))
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    ///
    /// ```text
    /// Idle | Closed | Failed ──connect──► Connecting
    /// Connecting ──handshake ok──► Connected
    /// Connecting ──handshake fail──► Failed
    /// Connecting | Connected ──disconnect / peer close──► Closing
    /// Connected ──transport error──► Failed
    /// Closing ──transport closed──► Closed
    /// ```
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle | Closed | Failed(_), Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed(_))
                | (Connecting, Closing)
                | (Connected, Closing)
                | (Connected, Failed(_))
                | (Closing, Closed)
        )
    }

    /// Short human-readable label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle | Self::Closed => "Disconnected",
            Self::Connecting => "Connecting…",
            Self::Connected => "Connected",
            Self::Closing => "Disconnecting…",
            Self::Failed(_) => "Error",
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

// MARK: - Payload

/// Body of an inbound data frame. Binary frames are never decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Binary(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Size in bytes (UTF-8 length for text).
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// MARK: - InboundMessage

/// A data frame delivered by the receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: Payload::Text(text.into()),
            received_at: Utc::now(),
        }
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            payload: Payload::Binary(data.into()),
            received_at: Utc::now(),
        }
    }
}

// MARK: - OutboundMessage

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub payload: String,
    pub submitted_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            submitted_at: Utc::now(),
        }
    }
}

// MARK: - SendOutcome

/// Completion of a single write that reached the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { elapsed: Duration },
    Failed { reason: String, elapsed: Duration },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Sent { elapsed } | Self::Failed { elapsed, .. } => *elapsed,
        }
    }

    /// A failed write is a transport fault; `Ok` carries the write latency.
    pub fn into_result(self) -> Result<Duration, SessionError> {
        match self {
            Self::Sent { elapsed } => Ok(elapsed),
            Self::Failed { reason, .. } => Err(TransportError::SendFailed { reason }.into()),
        }
    }
}

/// What the event sink receives once a send completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub message: OutboundMessage,
    pub outcome: SendOutcome,
}

// MARK: - PingOutcome

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingOutcome {
    /// Pong received; `rtt` measured from the ping write.
    Alive { rtt: Duration },
    Unreachable { reason: String },
}

impl PingOutcome {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive { .. })
    }

    /// Collapse into the error taxonomy, for callers that prefer `?`.
    pub fn into_result(self) -> Result<Duration, SessionError> {
        match self {
            Self::Alive { rtt } => Ok(rtt),
            Self::Unreachable { reason } => Err(SessionError::ProbeUnreachable { reason }),
        }
    }
}
