//! Scripted in-memory transport for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use socklink_core::TransportError;
use socklink_transport::{Connector, Frame, FrameReader, FrameWriter, TransportHandle};
use tokio::sync::mpsc;

use crate::SessionEvent;

/// What the session wrote to a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Written {
    Text(String),
    Ping(Bytes),
    Close(u16),
}

enum Scripted {
    Frame(Result<Frame, TransportError>),
    End,
}

// ── MockLink ──────────────────────────────────────────────────────────────────

/// Test-side view of one opened transport.
#[derive(Clone)]
pub(crate) struct MockLink {
    inbound: mpsc::UnboundedSender<Scripted>,
    written: Arc<Mutex<Vec<Written>>>,
    broken: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl MockLink {
    pub(crate) fn push(&self, frame: Frame) {
        let _ = self.inbound.send(Scripted::Frame(Ok(frame)));
    }

    pub(crate) fn push_error(&self, error: TransportError) {
        let _ = self.inbound.send(Scripted::Frame(Err(error)));
    }

    /// Make the reader yield `None`.
    pub(crate) fn end(&self) {
        let _ = self.inbound.send(Scripted::End);
    }

    pub(crate) fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Text and ping writes never complete, as when the peer stops reading.
    pub(crate) fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn written(&self) -> Vec<Written> {
        self.written.lock().unwrap().clone()
    }
}

// ── MockConnector ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Flags {
    refuse: AtomicBool,
    hold_handshake: AtomicBool,
    auto_pong: AtomicBool,
    ignore_close: AtomicBool,
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    flags: Arc<Flags>,
    opens: Arc<AtomicUsize>,
    links: Arc<Mutex<Vec<MockLink>>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every handshake fails.
    pub(crate) fn refuse(self) -> Self {
        self.flags.refuse.store(true, Ordering::SeqCst);
        self
    }

    /// Handshakes never complete.
    pub(crate) fn hold_handshake(self) -> Self {
        self.flags.hold_handshake.store(true, Ordering::SeqCst);
        self
    }

    /// Answer every ping with a pong carrying the same payload.
    pub(crate) fn auto_pong(self) -> Self {
        self.flags.auto_pong.store(true, Ordering::SeqCst);
        self
    }

    /// The peer never answers our close frame.
    pub(crate) fn ignore_close(self) -> Self {
        self.flags.ignore_close.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn set_refuse(&self, refuse: bool) {
        self.flags.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn last_link(&self) -> MockLink {
        self.links.lock().unwrap().last().cloned().expect("no transport opened")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &str) -> Result<TransportHandle, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.flags.hold_handshake.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.flags.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Handshake {
                reason: format!("{endpoint} refused the upgrade"),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let link = MockLink {
            inbound: tx,
            written: Arc::default(),
            broken: Arc::default(),
            stalled: Arc::default(),
        };
        self.links.lock().unwrap().push(link.clone());
        Ok(TransportHandle::new(
            Box::new(MockWriter {
                link,
                flags: Arc::clone(&self.flags),
            }),
            Box::new(MockReader { rx }),
        ))
    }
}

struct MockWriter {
    link: MockLink,
    flags: Arc<Flags>,
}

impl MockWriter {
    async fn stall_if_asked(&self) {
        if self.link.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn record(&self, written: Written) -> Result<(), TransportError> {
        if self.link.broken.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                reason: "broken pipe".into(),
            });
        }
        self.link.written.lock().unwrap().push(written);
        Ok(())
    }
}

#[async_trait]
impl FrameWriter for MockWriter {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.stall_if_asked().await;
        self.record(Written::Text(text.to_owned()))
    }

    async fn send_ping(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.stall_if_asked().await;
        self.record(Written::Ping(payload.clone()))?;
        if self.flags.auto_pong.load(Ordering::SeqCst) {
            self.link.push(Frame::Pong(payload));
        }
        Ok(())
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<(), TransportError> {
        self.record(Written::Close(code))?;
        if !self.flags.ignore_close.load(Ordering::SeqCst) {
            self.link.push(Frame::Close {
                code,
                reason: String::new(),
            });
            self.link.end();
        }
        Ok(())
    }
}

struct MockReader {
    rx: mpsc::UnboundedReceiver<Scripted>,
}

#[async_trait]
impl FrameReader for MockReader {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        match self.rx.recv().await? {
            Scripted::Frame(frame) => Some(frame),
            Scripted::End => None,
        }
    }
}

/// Collect exactly `count` events, panicking if one takes longer than `wait`.
pub(crate) async fn drain(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    count: usize,
    wait: Duration,
) -> Vec<SessionEvent> {
    let mut events = Vec::with_capacity(count);
    while events.len() < count {
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => panic!("sink channel closed after {events:?}"),
            Err(_) => panic!("timed out waiting for event {} after {events:?}", events.len()),
        }
    }
    events
}
