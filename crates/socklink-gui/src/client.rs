use std::sync::Arc;

use socklink_core::{ConnectionState, InboundMessage, Payload, PingOutcome, SendOutcome, SendReport, SessionConfig};
use socklink_session::{EventSink, Fanout, Session, TracingSink};
use tokio::sync::mpsc;
use tracing::info;

use crate::state::{Direction, SharedState};

/// Requests from the egui thread.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Connect(String),
    Disconnect,
    Send(String),
    Ping,
}

// ── Sink: session events → GuiState ───────────────────────────────────────────

struct GuiSink {
    state: SharedState,
    ctx:   egui::Context,
}

impl GuiSink {
    fn update(&self, f: impl FnOnce(&mut crate::state::GuiState)) {
        // A poisoned lock only means a panic mid-render; the data is still usable.
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut s);
        drop(s);
        self.ctx.request_repaint();
    }
}

impl EventSink for GuiSink {
    fn on_state_changed(&self, state: &ConnectionState) {
        self.update(|s| {
            s.state = state.clone();
            match state.failure_reason() {
                Some(reason) => s.push_log(format!("[ERROR] {}", reason)),
                None => s.push_log(state.label()),
            }
        });
    }

    fn on_message_received(&self, message: InboundMessage) {
        self.update(|s| {
            let text = match &message.payload {
                Payload::Text(text) => text.clone(),
                Payload::Binary(data) => format!("<{} bytes binary>", data.len()),
            };
            s.push_message(Direction::Received, text, message.received_at);
        });
    }

    fn on_send_completed(&self, report: &SendReport) {
        self.update(|s| match &report.outcome {
            SendOutcome::Sent { .. } => {
                s.push_message(Direction::Sent, report.message.payload.clone(), report.message.submitted_at);
            }
            SendOutcome::Failed { reason, .. } => {
                s.push_log(format!("[ERROR] Send failed: {}", reason));
            }
        });
    }

    fn on_ping_completed(&self, outcome: &PingOutcome) {
        self.update(|s| match outcome {
            PingOutcome::Alive { rtt } => {
                s.last_rtt_ms = Some(rtt.as_millis());
                s.push_log(format!("Pong in {} ms", rtt.as_millis()));
            }
            PingOutcome::Unreachable { reason } => {
                s.last_rtt_ms = None;
                s.push_log(format!("[WARN] Ping failed: {}", reason));
            }
        });
    }
}

// ── Entry point (called from the tokio runtime thread) ─────────────────────────

/// Owns the session for the lifetime of the window. Returns once the GUI side
/// of the command channel is dropped.
pub async fn run(
    config: SessionConfig,
    state: SharedState,
    ctx: egui::Context,
    mut commands: mpsc::UnboundedReceiver<UiCommand>,
) {
    let gui_sink = GuiSink {
        state: Arc::clone(&state),
        ctx,
    };
    let sinks = Fanout::new()
        .with(Arc::new(gui_sink))
        .with(Arc::new(TracingSink));
    let session = Arc::new(Session::new(config, Arc::new(sinks)));

    while let Some(command) = commands.recv().await {
        let session = Arc::clone(&session);
        let state = Arc::clone(&state);
        // Each request runs on its own task so a Disconnect can cut a pending handshake short.
        tokio::spawn(async move {
            let result = match command {
                UiCommand::Connect(endpoint) => session.connect(&endpoint).await,
                UiCommand::Disconnect => session.disconnect().await,
                UiCommand::Send(text) => session.send(&text).await.map(|_| ()),
                UiCommand::Ping => session.ping().await.map(|_| ()),
            };
            if let Err(e) = result {
                let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
                s.push_log(format!("[WARN] {}", e));
            }
        });
    }

    info!("GUI closed; shutting down session");
    let _ = session.disconnect().await;
}
