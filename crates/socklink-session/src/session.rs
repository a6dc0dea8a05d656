//! Session state machine.
//!
//! # Lifecycle
//!
//! ```text
//! 1. Session::new(config, sink)
//! 2. session.connect(url)          Idle → Connecting → Connected
//!       └─ spawns the receive loop (and the periodic pinger, if enabled)
//! 3. session.send(text) / session.ping()
//! 4. session.disconnect()          Connected → Closing → Closed
//!       └─ returns once the receive loop has exited
//! ```
//!
//! Every transition, and every write, goes through the single async mutex
//! around [`Link`]. The state itself is published on a `watch` channel so
//! readers never take that mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socklink_core::{ConnectionState, PingOutcome, SendOutcome, SessionConfig, SessionError, TransportError};
use socklink_transport::{Connector, FrameWriter, TransportHandle, WsConnector, CLOSE_GOING_AWAY};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::prober::{self, Probes};
use crate::recv_loop::{self, LoopEnd};
use crate::sink::EventSink;

// ── Shared internals ──────────────────────────────────────────────────────────

/// Everything owned by the current connection. Only touched under the mutex.
#[derive(Default)]
pub(crate) struct Link {
    pub(crate) transport_id: Option<Uuid>,
    pub(crate) writer: Option<Box<dyn FrameWriter>>,
    pub(crate) recv_task: Option<JoinHandle<()>>,
    pub(crate) recv_stop: Option<oneshot::Sender<()>>,
    pub(crate) handshake_cancel: Option<oneshot::Sender<()>>,
    pub(crate) pinger: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) link: Mutex<Link>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) probes: Probes,
    /// Bumped on every `connect`; written only while `link` is held.
    pub(crate) generation: AtomicU64,
}

impl Shared {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Apply one lifecycle edge. The `&mut Link` argument proves the caller
    /// holds the mutex, which keeps transitions totally ordered.
    pub(crate) fn transition(&self, _link: &mut Link, next: ConnectionState) -> bool {
        let current = self.state();
        if !current.can_transition_to(&next) {
            warn!("Rejected state transition {} → {}", current, next);
            return false;
        }
        debug!(generation = self.generation(), "State {} → {}", current, next);
        self.state_tx.send_replace(next.clone());
        self.sink.on_state_changed(&next);
        true
    }

    /// Drop everything tied to the current transport.
    pub(crate) fn release(&self, link: &mut Link) {
        if let Some(stop) = link.recv_stop.take() {
            let _ = stop.send(());
        }
        if let Some(pinger) = link.pinger.take() {
            pinger.abort();
        }
        link.writer = None;
        link.transport_id = None;
        self.probes.clear();
    }

    /// Terminal transport fault: `Connected → Failed`, receive loop stopped.
    pub(crate) fn fail_transport(&self, link: &mut Link, reason: String) {
        warn!(generation = self.generation(), "Transport failed: {}", reason);
        self.transition(link, ConnectionState::Failed(reason));
        self.release(link);
    }

    // ── connect ──────────────────────────────────────────────────────────────

    pub(crate) async fn connect(self: &Arc<Self>, endpoint: &str) -> Result<(), SessionError> {
        let (generation, cancel_rx) = {
            let mut link = self.link.lock().await;
            let state = self.state();
            if !state.can_connect() {
                return Err(SessionError::InvalidState {
                    operation: "connect",
                    state,
                });
            }
            // Caught here rather than as a panic inside the pinger.
            self.config.validate()?;
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
            link.handshake_cancel = Some(cancel_tx);
            self.transition(&mut link, ConnectionState::Connecting);
            (generation, cancel_rx)
        };
        info!(generation, "Connecting to {}", endpoint);

        let timeout_ms = self.config.connect_timeout_ms;
        let opened = tokio::select! {
            res = timeout(self.config.connect_timeout(), self.connector.open(endpoint)) => {
                res.unwrap_or(Err(TransportError::Timeout { ms: timeout_ms }))
            }
            _ = cancel_rx => {
                info!(generation, "Handshake cancelled");
                return Err(SessionError::Cancelled);
            }
        };

        let mut link = self.link.lock().await;
        if self.generation() != generation || self.state() != ConnectionState::Connecting {
            // disconnect() won the race while the handshake was finishing.
            if let Ok(mut handle) = opened {
                let _ = handle.writer.close(CLOSE_GOING_AWAY, "").await;
            }
            return Err(SessionError::Cancelled);
        }
        link.handshake_cancel = None;

        match opened {
            Err(e) => {
                let reason = match e {
                    TransportError::Handshake { reason } => reason,
                    other => other.to_string(),
                };
                warn!(generation, "Handshake with {} failed: {}", endpoint, reason);
                self.transition(&mut link, ConnectionState::Failed(reason.clone()));
                Err(SessionError::HandshakeFailure { reason })
            }
            Ok(handle) => {
                let TransportHandle { id, writer, reader } = handle;
                link.transport_id = Some(id);
                link.writer = Some(writer);
                let (stop_tx, stop_rx) = oneshot::channel::<()>();
                link.recv_stop = Some(stop_tx);

                // Connected is published before the loop can deliver anything.
                self.transition(&mut link, ConnectionState::Connected);
                link.recv_task = Some(tokio::spawn(recv_loop::run(
                    Arc::clone(self),
                    reader,
                    stop_rx,
                    generation,
                )));
                if self.config.enable_periodic_ping {
                    link.pinger = Some(prober::spawn_periodic(Arc::clone(self), generation));
                }
                info!(generation, transport = %id, "Connected to {}", endpoint);
                Ok(())
            }
        }
    }

    // ── disconnect ───────────────────────────────────────────────────────────

    pub(crate) async fn disconnect(&self) -> Result<(), SessionError> {
        let (generation, recv_task) = {
            let mut link = self.link.lock().await;
            let generation = self.generation();
            match self.state() {
                ConnectionState::Idle | ConnectionState::Closed | ConnectionState::Failed(_) => {
                    return Ok(());
                }
                ConnectionState::Connecting => {
                    self.transition(&mut link, ConnectionState::Closing);
                    if let Some(cancel) = link.handshake_cancel.take() {
                        let _ = cancel.send(());
                    }
                    self.transition(&mut link, ConnectionState::Closed);
                    return Ok(());
                }
                ConnectionState::Connected => {
                    info!(generation, "Disconnecting");
                    self.transition(&mut link, ConnectionState::Closing);
                    if let Some(pinger) = link.pinger.take() {
                        pinger.abort();
                    }
                    if let Some(writer) = link.writer.as_mut() {
                        match timeout(self.config.close_timeout(), writer.close(CLOSE_GOING_AWAY, "")).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => debug!(generation, "Close frame not sent: {}", e),
                            Err(_) => debug!(generation, "Close frame write timed out"),
                        }
                    }
                }
                // Another disconnect is already draining; wait for it below.
                ConnectionState::Closing => {}
            }
            (generation, link.recv_task.take())
        };

        let mut state_rx = self.state_tx.subscribe();
        let settled = |s: &ConnectionState| *s != ConnectionState::Closing;
        if timeout(self.config.close_timeout(), state_rx.wait_for(settled)).await.is_err() {
            warn!(
                generation,
                "Peer did not finish the close handshake within {}ms; stopping receive loop",
                self.config.close_timeout_ms
            );
            let mut link = self.link.lock().await;
            if self.generation() == generation {
                if let Some(stop) = link.recv_stop.take() {
                    let _ = stop.send(());
                }
            }
        }
        if let Some(task) = recv_task {
            let _ = task.await;
        }
        if timeout(self.config.close_timeout(), state_rx.wait_for(settled)).await.is_err() {
            let mut link = self.link.lock().await;
            if self.generation() == generation && self.state() == ConnectionState::Closing {
                self.release(&mut link);
                self.transition(&mut link, ConnectionState::Closed);
            }
        }
        info!(generation, "Disconnected");
        Ok(())
    }

    // ── receive loop callbacks ───────────────────────────────────────────────

    /// The peer started the close handshake; tungstenite answers it.
    pub(crate) async fn peer_closing(&self, generation: u64, code: u16, reason: &str) {
        let mut link = self.link.lock().await;
        if self.generation() != generation {
            return;
        }
        if self.state() == ConnectionState::Connected {
            info!(generation, "Peer closed the connection (code {}, '{}')", code, reason);
            self.transition(&mut link, ConnectionState::Closing);
            if let Some(pinger) = link.pinger.take() {
                pinger.abort();
            }
        }
    }

    /// Last thing the receive loop does before returning.
    pub(crate) async fn finish_receive(&self, generation: u64, end: LoopEnd) {
        let mut link = self.link.lock().await;
        if self.generation() != generation {
            debug!(generation, "Stale receive loop finished");
            return;
        }
        // The loop is exiting on its own; dropping the handle just detaches it.
        link.recv_task = None;
        self.release(&mut link);

        match (self.state(), end) {
            (ConnectionState::Closing, LoopEnd::Failed(e)) => {
                debug!(generation, "Transport error while closing: {}", e);
                self.transition(&mut link, ConnectionState::Closed);
            }
            (ConnectionState::Closing, _) => {
                self.transition(&mut link, ConnectionState::Closed);
            }
            (ConnectionState::Connected, LoopEnd::Failed(e)) => {
                self.fail_transport(&mut link, e.to_string());
            }
            (ConnectionState::Connected, LoopEnd::Ended) => {
                self.fail_transport(&mut link, TransportError::ConnectionClosed.to_string());
            }
            (ConnectionState::Connected, LoopEnd::Stopped) => {
                self.fail_transport(&mut link, "receive loop stopped".to_owned());
            }
            // Already Failed/Closed by the send path or by disconnect().
            _ => {}
        }
    }
}

// ── Session (public handle) ───────────────────────────────────────────────────

/// Manages exactly one logical WebSocket connection at a time.
///
/// Share it behind an `Arc` to drive it from several tasks; every operation
/// takes `&self`.
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Session over the tokio-tungstenite transport.
    pub fn new(config: SessionConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::with_connector(config, Arc::new(WsConnector), sink)
    }

    pub fn with_connector(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                sink,
                link: Mutex::new(Link::default()),
                state_tx,
                probes: Probes::default(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Open a connection to `endpoint`. Valid from `Idle`, `Closed` and
    /// `Failed`; returns once the handshake has succeeded or failed.
    pub async fn connect(&self, endpoint: &str) -> Result<(), SessionError> {
        self.shared.connect(endpoint).await
    }

    /// [`connect`](Self::connect) to the configured endpoint.
    pub async fn connect_default(&self) -> Result<(), SessionError> {
        let endpoint = self.shared.config.endpoint.clone();
        self.shared.connect(&endpoint).await
    }

    /// Close with code 1001 and wait for the receive loop to exit.
    /// A no-op when nothing is open.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.shared.disconnect().await
    }

    /// Send one text frame. Rejected locally with `NotConnected` or
    /// `EmptyMessage`; a write fault fails the session.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SessionError> {
        self.shared.send(text).await
    }

    /// Liveness probe. Never changes the connection state.
    pub async fn ping(&self) -> Result<PingOutcome, SessionError> {
        self.shared.ping().await
    }

    /// Snapshot of the current state; never blocks.
    pub fn current_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Receiver that observes every state the session publishes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Identity of the open transport, if any.
    pub async fn transport_id(&self) -> Option<Uuid> {
        self.shared.link.lock().await.transport_id
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl Shared {
    /// Best-effort teardown when the last handle goes away.
    fn shut_down(&self, link: &mut Link) {
        if !self.state().is_active() {
            return;
        }
        // Background tasks finishing after this point see a stale generation.
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(cancel) = link.handshake_cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(mut writer) = link.writer.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = writer.close(CLOSE_GOING_AWAY, "").await;
                });
            }
        }
        self.release(link);
        if self.state() != ConnectionState::Closing {
            self.transition(link, ConnectionState::Closing);
        }
        self.transition(link, ConnectionState::Closed);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut link) = self.shared.link.try_lock() {
            self.shared.shut_down(&mut link);
            return;
        }
        // A task still holds the link; finish once it lets go.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                handle.spawn(async move {
                    let mut link = shared.link.lock().await;
                    shared.shut_down(&mut link);
                });
            }
            Err(_) => warn!(
                state = %self.shared.state(),
                "Session dropped outside a runtime while busy; transport not released"
            ),
        }
    }
}
