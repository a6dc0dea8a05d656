//! tokio-tungstenite implementation of the transport traits.
//!
//! [`WsConnector::open`] performs the HTTP upgrade (TLS via rustls for
//! `wss://`) and splits the stream: the sink becomes a [`WsWriter`], the
//! stream a [`WsReader`].

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use socklink_core::TransportError;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info};

use crate::{Connector, Frame, FrameReader, FrameWriter, TransportHandle, CLOSE_NO_STATUS};

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// ── Connector ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<TransportHandle, TransportError> {
        use tungstenite::client::IntoClientRequest;

        let url = normalize_endpoint(endpoint);
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: e.to_string(),
            })?;

        let (ws_stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Handshake {
                reason: e.to_string(),
            })?;
        info!("WebSocket connected to {} (HTTP {})", url, response.status());

        let (sink, stream) = ws_stream.split();
        Ok(TransportHandle::new(
            Box::new(WsWriter { sink }),
            Box::new(WsReader { stream }),
        ))
    }
}

// ── Write half ────────────────────────────────────────────────────────────────

pub struct WsWriter {
    sink: SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::text(text.to_owned()))
            .await
            .map_err(send_error)
    }

    async fn send_ping(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Ping(payload))
            .await
            .map_err(send_error)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.sink
            .send(tungstenite::Message::Close(Some(frame)))
            .await
            .map_err(send_error)
    }
}

fn send_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::ConnectionClosed
        }
        other => TransportError::SendFailed {
            reason: other.to_string(),
        },
    }
}

// ── Read half ─────────────────────────────────────────────────────────────────

pub struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                // Close handshake finished: a clean end, not a fault.
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => {
                    return Some(Err(TransportError::ReceiveFailed {
                        reason: e.to_string(),
                    }))
                }
            };
            let frame = match message {
                tungstenite::Message::Text(text) => Frame::Text(text.as_str().to_owned()),
                tungstenite::Message::Binary(data) => Frame::Binary(data),
                tungstenite::Message::Ping(data) => Frame::Ping(data),
                tungstenite::Message::Pong(data) => Frame::Pong(data),
                tungstenite::Message::Close(close_frame) => {
                    let (code, reason) = close_frame
                        .map(|cf| (u16::from(cf.code), cf.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    Frame::Close { code, reason }
                }
                tungstenite::Message::Frame(_) => {
                    debug!("Skipping raw frame");
                    continue;
                }
            };
            return Some(Ok(frame));
        }
    }
}

// ── Endpoint helpers ──────────────────────────────────────────────────────────

/// Map `http(s)://` onto `ws(s)://`; anything else passes through unchanged.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        endpoint.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::time::timeout;

    use super::*;
    use crate::CLOSE_GOING_AWAY;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Echo server on an ephemeral port. Echoes text and binary frames;
    /// pings are answered by tungstenite itself.
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
                        if msg.is_text() || msg.is_binary() {
                            if ws.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });
        format!("ws://{}", addr)
    }

    #[test]
    fn normalize_https_to_wss() {
        assert_eq!(normalize_endpoint("https://example.com"), "wss://example.com");
    }

    #[test]
    fn normalize_http_to_ws_with_path() {
        assert_eq!(
            normalize_endpoint("http://localhost:3000/cable"),
            "ws://localhost:3000/cable"
        );
    }

    #[test]
    fn normalize_passes_ws_schemes_through() {
        assert_eq!(normalize_endpoint("wss://echo.websocket.org"), "wss://echo.websocket.org");
        assert_eq!(normalize_endpoint(" ws://127.0.0.1:9/x "), "ws://127.0.0.1:9/x");
    }

    #[tokio::test]
    async fn open_invalid_url_is_invalid_endpoint() {
        let err = WsConnector.open("not-a-url").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn open_unreachable_host_is_handshake_error() {
        let err = WsConnector.open("ws://127.0.0.1:1/nothing").await.unwrap_err();
        assert!(matches!(err, TransportError::Handshake { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn text_is_echoed_and_ping_gets_pong() {
        let url = spawn_echo_server().await;
        let mut handle = timeout(TIMEOUT, WsConnector.open(&url)).await.unwrap().unwrap();

        handle.writer.send_text("hello").await.unwrap();
        let frame = timeout(TIMEOUT, handle.reader.recv()).await.unwrap();
        assert_eq!(frame, Some(Ok(Frame::Text("hello".into()))));

        handle.writer.send_ping(Bytes::from_static(b"probe")).await.unwrap();
        let frame = timeout(TIMEOUT, handle.reader.recv()).await.unwrap();
        assert_eq!(frame, Some(Ok(Frame::Pong(Bytes::from_static(b"probe")))));
    }

    #[tokio::test]
    async fn close_handshake_ends_the_stream() {
        let url = spawn_echo_server().await;
        let mut handle = timeout(TIMEOUT, WsConnector.open(&url)).await.unwrap().unwrap();

        handle.writer.close(CLOSE_GOING_AWAY, "bye").await.unwrap();

        let mut saw_close = false;
        while let Some(frame) = timeout(TIMEOUT, handle.reader.recv()).await.unwrap() {
            if let Ok(Frame::Close { code, .. }) = frame {
                assert_eq!(code, CLOSE_GOING_AWAY);
                saw_close = true;
            }
        }
        assert!(saw_close);
    }
}
