//! Liveness prober: on-demand pings and the optional periodic pinger.
//!
//! Each probe writes a ping frame whose payload is an 8-byte big-endian
//! sequence number. The receive loop hands pongs to [`Probes::resolve`],
//! which wakes the matching waiter. A probe never changes the connection
//! state: only the receive loop and the send gateway decide that the
//! transport is dead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use socklink_core::{ConnectionState, PingOutcome, SessionError, TransportError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::session::Shared;

// ── Outstanding probes ────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct Probes {
    next_seq: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<()>>>,
}

impl Probes {
    fn waiting(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<()>>> {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn register(&self) -> (u64, oneshot::Receiver<()>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting().insert(seq, tx);
        (seq, rx)
    }

    /// Match a pong payload to its probe. `false` when nothing was waiting.
    pub(crate) fn resolve(&self, payload: &[u8]) -> bool {
        let Ok(raw) = <[u8; 8]>::try_from(payload) else {
            return false;
        };
        match self.waiting().remove(&u64::from_be_bytes(raw)) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub(crate) fn forget(&self, seq: u64) {
        self.waiting().remove(&seq);
    }

    /// Drop every waiter; their receivers see the sender go away.
    pub(crate) fn clear(&self) {
        self.waiting().clear();
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.waiting().len()
    }
}

// ── ping ──────────────────────────────────────────────────────────────────────

impl Shared {
    pub(crate) async fn ping(&self) -> Result<PingOutcome, SessionError> {
        let (seq, pong_rx, started) = {
            let mut link = self.link.lock().await;
            let state = self.state();
            if state != ConnectionState::Connected {
                return Err(SessionError::NotConnected { state });
            }
            let Some(writer) = link.writer.as_mut() else {
                return Err(SessionError::NotConnected { state });
            };

            let (seq, pong_rx) = self.probes.register();
            let started = Instant::now();
            let payload = Bytes::copy_from_slice(&seq.to_be_bytes());
            let written = timeout(self.config.write_timeout(), writer.send_ping(payload))
                .await
                .unwrap_or(Err(TransportError::Timeout {
                    ms: self.config.write_timeout_ms,
                }));
            if let Err(e) = written {
                self.probes.forget(seq);
                let outcome = PingOutcome::Unreachable {
                    reason: e.to_string(),
                };
                self.sink.on_ping_completed(&outcome);
                return Ok(outcome);
            }
            (seq, pong_rx, started)
        };

        let outcome = match timeout(self.config.ping_timeout(), pong_rx).await {
            Ok(Ok(())) => PingOutcome::Alive {
                rtt: started.elapsed(),
            },
            Ok(Err(_)) => PingOutcome::Unreachable {
                reason: "connection ended before pong".to_owned(),
            },
            Err(_) => {
                self.probes.forget(seq);
                PingOutcome::Unreachable {
                    reason: format!("no pong within {}ms", self.config.ping_timeout_ms),
                }
            }
        };
        debug!(seq, "Probe finished: {:?}", outcome);
        self.sink.on_ping_completed(&outcome);
        Ok(outcome)
    }
}

// ── Periodic pinger ───────────────────────────────────────────────────────────

/// Probe every `ping_interval` while the given generation stays `Connected`.
pub(crate) fn spawn_periodic(shared: Arc<Shared>, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = shared.config.ping_interval();
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut state_rx = shared.state_tx.subscribe();
        info!(generation, "Periodic ping every {:?}", period);

        loop {
            let ticked = tokio::select! {
                _ = ticker.tick() => true,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
            };
            if shared.generation() != generation || !shared.state().is_connected() {
                break;
            }
            if !ticked {
                continue;
            }
            match shared.ping().await {
                Ok(PingOutcome::Alive { rtt }) => debug!(generation, "Keepalive rtt {:?}", rtt),
                Ok(PingOutcome::Unreachable { reason }) => warn!(generation, "Keepalive missed: {}", reason),
                Err(_) => break,
            }
        }
        debug!(generation, "Periodic pinger stopped");
    })
}
