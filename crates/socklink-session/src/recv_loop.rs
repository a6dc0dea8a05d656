//! Receive loop: one task per open transport.
//!
//! Reads frames until the transport ends, errors, or the session tells it to
//! stop, then hands the outcome to [`Shared::finish_receive`]. Frames are
//! delivered to the sink in the order they were read.

use std::sync::Arc;

use socklink_core::{InboundMessage, TransportError};
use socklink_transport::{Frame, FrameReader};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::session::Shared;

/// Why the loop returned.
#[derive(Debug)]
pub(crate) enum LoopEnd {
    /// Reader yielded `None`.
    Ended,
    Failed(TransportError),
    /// Stop signal from the session.
    Stopped,
}

pub(crate) async fn run(
    shared: Arc<Shared>,
    mut reader: Box<dyn FrameReader>,
    mut stop_rx: oneshot::Receiver<()>,
    generation: u64,
) {
    debug!(generation, "Receive loop started");
    let end = loop {
        let next = tokio::select! {
            biased;
            _ = &mut stop_rx => break LoopEnd::Stopped,
            next = reader.recv() => next,
        };

        match next {
            None => break LoopEnd::Ended,
            Some(Err(e)) => break LoopEnd::Failed(e),
            Some(Ok(frame)) => match frame {
                Frame::Text(text) => shared.sink.on_message_received(InboundMessage::text(text)),
                Frame::Binary(data) => {
                    trace!(generation, "Binary frame: {} bytes", data.len());
                    shared.sink.on_message_received(InboundMessage::binary(data));
                }
                Frame::Pong(payload) => {
                    if !shared.probes.resolve(&payload) {
                        debug!(generation, "Unsolicited pong ({} bytes)", payload.len());
                    }
                }
                // tungstenite queues the pong itself.
                Frame::Ping(_) => trace!(generation, "Ping from peer"),
                Frame::Close { code, reason } => {
                    shared.peer_closing(generation, code, &reason).await;
                }
            },
        }
    };

    debug!(generation, "Receive loop finished: {:?}", end);
    shared.finish_receive(generation, end).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use socklink_core::{ConnectionState, Payload, SessionConfig};
    use socklink_transport::Frame;

    use crate::testing::{drain, MockConnector};
    use crate::{ChannelSink, Session, SessionEvent};

    fn session(connector: &MockConnector) -> (Session, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
        let (sink, rx) = ChannelSink::new();
        let config = SessionConfig {
            close_timeout_ms: 200,
            ..SessionConfig::default()
        };
        (
            Session::with_connector(config, Arc::new(connector.clone()), Arc::new(sink)),
            rx,
        )
    }

    #[tokio::test]
    async fn inbound_frames_reach_sink_in_order() {
        let connector = MockConnector::new();
        let (session, mut rx) = session(&connector);
        session.connect("ws://mock").await.unwrap();
        let link = connector.last_link();

        link.push(Frame::Text("one".into()));
        link.push(Frame::Binary(Bytes::from_static(&[1, 2, 3])));
        link.push(Frame::Text("three".into()));

        let events = drain(&mut rx, 5, Duration::from_secs(2)).await;
        let payloads: Vec<Payload> = events
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::MessageReceived(m) => Some(m.payload),
                _ => None,
            })
            .collect();
        assert_eq!(
            payloads,
            vec![
                Payload::Text("one".into()),
                Payload::Binary(Bytes::from_static(&[1, 2, 3])),
                Payload::Text("three".into()),
            ]
        );
    }

    #[tokio::test]
    async fn stream_end_while_connected_is_a_failure() {
        let connector = MockConnector::new();
        let (session, _rx) = session(&connector);
        session.connect("ws://mock").await.unwrap();

        connector.last_link().end();

        let mut state_rx = session.subscribe();
        tokio::time::timeout(Duration::from_secs(2), state_rx.wait_for(|s| s.failure_reason().is_some()))
            .await
            .unwrap()
            .unwrap();
        assert!(session.transport_id().await.is_none());
    }

    #[tokio::test]
    async fn peer_close_goes_through_closing_to_closed() {
        let connector = MockConnector::new();
        let (session, mut rx) = session(&connector);
        session.connect("ws://mock").await.unwrap();
        let link = connector.last_link();

        link.push(Frame::Close { code: 1000, reason: "bye".into() });
        link.end();

        let events = drain(&mut rx, 4, Duration::from_secs(2)).await;
        let states: Vec<ConnectionState> = events
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Closing,
                ConnectionState::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn receive_error_fails_the_session() {
        let connector = MockConnector::new();
        let (session, _rx) = session(&connector);
        session.connect("ws://mock").await.unwrap();

        connector.last_link().push_error(socklink_core::TransportError::ReceiveFailed {
            reason: "reset by peer".into(),
        });

        let mut state_rx = session.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            state_rx.wait_for(|s| s.failure_reason().is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(state.failure_reason().unwrap().contains("reset by peer"));
    }
}
