//! WebSocket dialer backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use crate::{ConnError, ConnSink, ConnStream, Connection, Dialer, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const USER_AGENT_VALUE: &str = "fleetlink-rust-sdk/1.0";

/// Dials one WebSocket connection per [`Dialer::dial`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsocketDialer {
    buffer_size: Option<usize>,
}

impl WebsocketDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the socket read/write buffer capacity.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: Some(buffer_size),
        }
    }
}

#[async_trait]
impl Dialer for WebsocketDialer {
    async fn dial(&self, url: &str) -> Result<Connection, ConnError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnError::abnormal(format!("invalid connect url: {e}")))?;
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let config = self.buffer_size.map(|size| {
            WebSocketConfig::default()
                .read_buffer_size(size)
                .write_buffer_size(size)
        });
        let (ws, response) = connect_async_with_config(request, config, false)
            .await
            .map_err(|e| ConnError::abnormal(format!("connection error: {e}")))?;
        tracing::debug!(status = ?response.status(), "websocket dial succeeded");

        let (sink, stream) = ws.split();
        Ok(Connection {
            sink: Box::new(TungsteniteSink { sink }),
            stream: Box::new(TungsteniteStream { stream }),
        })
    }
}

/// Classifies a tungstenite error: errors raised after a completed close
/// handshake are clean, everything else is abnormal.
fn classify(err: WsError) -> ConnError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            ConnError::clean_close(err.to_string())
        }
        other => ConnError::abnormal(other.to_string()),
    }
}

struct TungsteniteSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl ConnSink for TungsteniteSink {
    async fn send_text(&mut self, data: &[u8]) -> Result<(), ConnError> {
        let text = String::from_utf8_lossy(data).into_owned();
        self.sink.send(Message::Text(text.into())).await.map_err(classify)
    }

    async fn close(&mut self) -> Result<(), ConnError> {
        match self.sink.close().await {
            Ok(()) => Ok(()),
            // Already closed is a successful close, not a failure.
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }
}

struct TungsteniteStream {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl ConnStream for TungsteniteStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, ConnError>> {
        loop {
            return match self.stream.next().await? {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
                Ok(Message::Close(frame)) => Some(Ok(Frame::Close {
                    code: frame.as_ref().map(|f| u16::from(f.code)),
                    reason: frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_default(),
                })),
                // Ping/pong are protocol plumbing; the library answers them.
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(Message::Frame(_)) => continue,
                Err(e) => Some(Err(classify(e))),
            };
        }
    }
}
