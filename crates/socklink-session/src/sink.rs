//! Event sink contract and the stock sinks.
//!
//! Every callback may run on the receive loop's task, so implementations must
//! return quickly and never block. UIs redispatch to their own thread (the
//! channel sink is the usual way to do that).

use std::sync::Arc;

use socklink_core::{ConnectionState, InboundMessage, Payload, PingOutcome, SendOutcome, SendReport};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Observer of a session.
pub trait EventSink: Send + Sync + 'static {
    fn on_state_changed(&self, _state: &ConnectionState) {}

    fn on_message_received(&self, _message: InboundMessage) {}

    fn on_send_completed(&self, _report: &SendReport) {}

    fn on_ping_completed(&self, _outcome: &PingOutcome) {}
}

/// Discards everything.
impl EventSink for () {}

// ── SessionEvent / ChannelSink ────────────────────────────────────────────────

/// Owned form of a sink callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    MessageReceived(InboundMessage),
    SendCompleted(SendReport),
    PingCompleted(PingOutcome),
}

/// Forwards every callback into an unbounded channel, preserving call order.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_state_changed(&self, state: &ConnectionState) {
        self.forward(SessionEvent::StateChanged(state.clone()));
    }

    fn on_message_received(&self, message: InboundMessage) {
        self.forward(SessionEvent::MessageReceived(message));
    }

    fn on_send_completed(&self, report: &SendReport) {
        self.forward(SessionEvent::SendCompleted(report.clone()));
    }

    fn on_ping_completed(&self, outcome: &PingOutcome) {
        self.forward(SessionEvent::PingCompleted(outcome.clone()));
    }
}

// ── TracingSink ───────────────────────────────────────────────────────────────

/// Logs every session event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_state_changed(&self, state: &ConnectionState) {
        match state {
            ConnectionState::Failed(reason) => warn!("Session failed: {}", reason),
            other => info!("Session state: {}", other),
        }
    }

    fn on_message_received(&self, message: InboundMessage) {
        match &message.payload {
            Payload::Text(text) => info!("Received text: '{}'", text),
            Payload::Binary(data) => info!("Received binary: {} bytes", data.len()),
        }
    }

    fn on_send_completed(&self, report: &SendReport) {
        match &report.outcome {
            SendOutcome::Sent { elapsed } => info!(
                "Sent '{}' after {:.3}s",
                report.message.payload,
                elapsed.as_secs_f64()
            ),
            SendOutcome::Failed { reason, elapsed } => warn!(
                "Failed to send '{}' after {:.3}s: {}",
                report.message.payload,
                elapsed.as_secs_f64(),
                reason
            ),
        }
    }

    fn on_ping_completed(&self, outcome: &PingOutcome) {
        match outcome {
            PingOutcome::Alive { rtt } => info!("Ping ok ({} ms)", rtt.as_millis()),
            PingOutcome::Unreachable { reason } => warn!("Ping failed: {}", reason),
        }
    }
}

// ── Fanout ────────────────────────────────────────────────────────────────────

/// Delivers each event to several sinks, in insertion order.
#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for Fanout {
    fn on_state_changed(&self, state: &ConnectionState) {
        for sink in &self.sinks {
            sink.on_state_changed(state);
        }
    }

    fn on_message_received(&self, message: InboundMessage) {
        for sink in &self.sinks {
            sink.on_message_received(message.clone());
        }
    }

    fn on_send_completed(&self, report: &SendReport) {
        for sink in &self.sinks {
            sink.on_send_completed(report);
        }
    }

    fn on_ping_completed(&self, outcome: &PingOutcome) {
        for sink in &self.sinks {
            sink.on_ping_completed(outcome);
        }
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout").field("sinks", &self.sinks.len()).finish()
    }
}
