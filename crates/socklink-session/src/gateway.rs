//! Send gateway: the only path from callers to the write half.

use std::time::Instant;

use socklink_core::{ConnectionState, OutboundMessage, SendOutcome, SendReport, SessionError, TransportError};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::session::Shared;

impl Shared {
    pub(crate) async fn send(&self, text: &str) -> Result<SendOutcome, SessionError> {
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let mut link = self.link.lock().await;
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(SessionError::NotConnected { state });
        }
        let Some(writer) = link.writer.as_mut() else {
            return Err(SessionError::NotConnected { state });
        };

        let message = OutboundMessage::new(text);
        let started = Instant::now();
        // The link stays locked for the whole write, so it is bounded.
        let result = timeout(self.config.write_timeout(), writer.send_text(text))
            .await
            .unwrap_or(Err(TransportError::Timeout {
                ms: self.config.write_timeout_ms,
            }));
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(()) => {
                debug!(generation = self.generation(), "Sent {} bytes in {:?}", text.len(), elapsed);
                SendOutcome::Sent { elapsed }
            }
            Err(e) => {
                warn!(generation = self.generation(), "Write failed: {}", e);
                let reason = match e {
                    TransportError::SendFailed { reason } => reason,
                    other => other.to_string(),
                };
                SendOutcome::Failed { reason, elapsed }
            }
        };

        // Report before any state change so observers see the failed send
        // ahead of the resulting `Failed` state.
        self.sink.on_send_completed(&SendReport {
            message,
            outcome: outcome.clone(),
        });
        if let SendOutcome::Failed { reason, .. } = &outcome {
            self.fail_transport(&mut link, reason.clone());
        }
        Ok(outcome)
    }
}
