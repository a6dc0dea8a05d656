//! End-to-end: a real `Session` against a local tungstenite echo server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use socklink_session::{
    ChannelSink, ConnectionState, Fanout, Payload, PingOutcome, SendOutcome, Session, SessionConfig,
    SessionError, SessionEvent, TracingSink,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if (msg.is_text() || msg.is_binary()) && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    format!("ws://{}", addr)
}

/// Accepts the upgrade, then drops the socket without a close frame.
async fn spawn_vanishing_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((tcp, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(tcp).await {
                tokio::time::sleep(Duration::from_millis(100)).await;
                drop(ws);
            }
        }
    });
    format!("ws://{}", addr)
}

fn session(endpoint: &str) -> (Session, UnboundedReceiver<SessionEvent>) {
    let (sink, rx) = ChannelSink::new();
    let sinks = Fanout::new().with(Arc::new(TracingSink)).with(Arc::new(sink));
    let config = SessionConfig {
        ping_timeout_ms: 2_000,
        close_timeout_ms: 1_000,
        ..SessionConfig::with_endpoint(endpoint)
    };
    (Session::new(config, Arc::new(sinks)), rx)
}

async fn next_event(rx: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, rx.recv()).await.expect("event timeout").expect("sink closed")
}

#[tokio::test]
async fn echo_round_trip() {
    let url = spawn_echo_server().await;
    let (session, mut rx) = session(&url);

    session.connect_default().await.unwrap();
    assert_eq!(next_event(&mut rx).await, SessionEvent::StateChanged(ConnectionState::Connecting));
    assert_eq!(next_event(&mut rx).await, SessionEvent::StateChanged(ConnectionState::Connected));

    let outcome = session.send("ping-1").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent { .. }));

    let mut reported = false;
    let mut echoed = false;
    for _ in 0..2 {
        match next_event(&mut rx).await {
            SessionEvent::SendCompleted(report) => {
                assert_eq!(report.message.payload, "ping-1");
                assert!(report.outcome.is_sent());
                reported = true;
            }
            SessionEvent::MessageReceived(msg) => {
                assert_eq!(msg.payload, Payload::Text("ping-1".into()));
                echoed = true;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(reported && echoed);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn ping_measures_round_trip() {
    let url = spawn_echo_server().await;
    let (session, _rx) = session(&url);
    session.connect(&url).await.unwrap();

    let outcome = session.ping().await.unwrap();
    match outcome {
        PingOutcome::Alive { rtt } => assert!(rtt < WAIT),
        other => panic!("expected Alive, got {other:?}"),
    }
    assert!(session.current_state().is_connected());

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn disconnect_is_quiet_afterwards() {
    let url = spawn_echo_server().await;
    let (session, mut rx) = session(&url);
    session.connect(&url).await.unwrap();

    session.disconnect().await.unwrap();
    assert_eq!(session.current_state(), ConnectionState::Closed);

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            SessionEvent::StateChanged(ConnectionState::Connecting),
            SessionEvent::StateChanged(ConnectionState::Connected),
            SessionEvent::StateChanged(ConnectionState::Closing),
            SessionEvent::StateChanged(ConnectionState::Closed),
        ]
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    let err = session.send("late").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected { state: ConnectionState::Closed }));
}

#[tokio::test]
async fn server_vanishing_fails_the_session() {
    let url = spawn_vanishing_server().await;
    let (session, _rx) = session(&url);
    session.connect(&url).await.unwrap();

    let mut state_rx = session.subscribe();
    timeout(WAIT, state_rx.wait_for(|s| s.failure_reason().is_some()))
        .await
        .unwrap()
        .unwrap();

    let err = session.ping().await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected { .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_handshake_failure() {
    let (session, _rx) = session("ws://127.0.0.1:1/none");

    let err = session.connect_default().await.unwrap_err();
    assert!(matches!(err, SessionError::HandshakeFailure { .. }));
    assert!(matches!(session.current_state(), ConnectionState::Failed(_)));
}
