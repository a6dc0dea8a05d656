//! socklink-transport — the transport handle behind a trait seam.
//!
//! A [`Connector`] opens one duplex WebSocket and hands back a
//! [`TransportHandle`]: a write half ([`FrameWriter`]) that the session keeps
//! behind its mutex, and a read half ([`FrameReader`]) owned by the receive
//! loop.
//!
//! ```text
//! Session ── Connector::open(url) ──► TransportHandle { id, writer, reader }
//!    │                                     │          │
//!    └── send_text / send_ping / close ◄───┘          └──► receive loop
//! ```
//!
//! The production implementation is [`ws::WsConnector`] (tokio-tungstenite).

use async_trait::async_trait;
use bytes::Bytes;
use socklink_core::TransportError;
use uuid::Uuid;

pub mod ws;

pub use ws::{normalize_endpoint, WsConnector};

/// Endpoint is going away (client shutting the session down).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// No status code was present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;

// MARK: - Frame

/// One frame read from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close { code: u16, reason: String },
}

// MARK: - Transport traits

/// Opens transports. One call, one fresh connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<TransportHandle, TransportError>;
}

/// Write half. Not `Clone`: one writer at a time.
#[async_trait]
pub trait FrameWriter: Send {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    async fn send_ping(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Start the close handshake. The read half keeps yielding until the
    /// peer's close frame arrives and the stream ends.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Read half.
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame; `None` once the connection has ended cleanly.
    ///
    /// Must be cancel-safe: the receive loop races it against a stop signal.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;
}

// MARK: - TransportHandle

/// An open connection, split for independent reading and writing.
pub struct TransportHandle {
    pub id: Uuid,
    pub writer: Box<dyn FrameWriter>,
    pub reader: Box<dyn FrameReader>,
}

impl TransportHandle {
    pub fn new(writer: Box<dyn FrameWriter>, reader: Box<dyn FrameReader>) -> Self {
        Self {
            id: Uuid::new_v4(),
            writer,
            reader,
        }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle").field("id", &self.id).finish()
    }
}
