//! socklink-session — lifecycle manager for a single WebSocket connection.
//!
//! ```text
//!  caller ──connect/disconnect──► Session ──Connector::open──► transport
//!  caller ──send──────────────►  (mutex)  ──FrameWriter──────►    │
//!  caller ──ping──────────────►     │                             │
//!                                   │ ◄──── receive loop ◄──FrameReader
//!                                   ▼
//!                              EventSink (state, messages, send/ping results)
//! ```
//!
//! One [`Session`] owns at most one transport at a time. State transitions,
//! writes and sink callbacks for lifecycle events are serialized behind one
//! async mutex, so observers see events in the order they happened.

mod gateway;
mod prober;
mod recv_loop;
mod session;
pub mod sink;

#[cfg(test)]
mod testing;

pub use session::Session;
pub use sink::{ChannelSink, EventSink, Fanout, SessionEvent, TracingSink};
pub use socklink_core::{
    ConnectionState, InboundMessage, OutboundMessage, Payload, PingOutcome, SendOutcome, SendReport,
    SessionConfig, SessionError,
};
