//! Transport layer for the fleetlink SDK.
//!
//! Provides the trait seams the reconnecting transport is built on:
//!
//! - [`Dialer`] — establishes one socket and hands back its two halves.
//!   The production implementation ([`WebsocketDialer`]) dials with
//!   `tokio-tungstenite`; tests substitute scripted dialers to drive the
//!   failure paths deterministically.
//! - [`ConnSink`] / [`ConnStream`] — the write and read halves of one
//!   socket, speaking [`Frame`]s and classified [`ConnError`]s.
//! - [`Transport`] — what the layers above consume: connect, write,
//!   reconnect, close, and a single registered read handler.
//!
//! The transport owns exactly one socket at a time and replaces it on
//! reconnect; see [`WebsocketTransport`].

mod dialer;
mod retry;
mod websocket;

pub use dialer::WebsocketDialer;
pub use retry::{RetryConfig, RetryTransport};
pub use websocket::WebsocketTransport;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use fleetlink_protocol::FleetError;

/// Callback invoked with the bytes of each inbound text frame. Each
/// invocation runs on a fresh task so a slow handler cannot stall reads.
pub type ReadHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A frame read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame; the only kind that carries protocol messages.
    Text(String),

    /// A binary frame. The service never sends these; they are logged
    /// and skipped.
    Binary(Vec<u8>),

    /// The peer initiated a close handshake.
    Close {
        /// The close code, when the peer supplied one.
        code: Option<u16>,
        reason: String,
    },
}

/// A socket-level failure, classified by whether it represents a clean
/// close (the peer completed a close handshake) or a network abnormality.
///
/// The classification drives the transport's recovery decisions: abnormal
/// errors may trigger a reconnect, clean-close errors never do.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ConnError {
    /// True unless the error is part of a clean close.
    pub abnormal: bool,
    pub message: String,
}

impl ConnError {
    /// An error outside the clean-close protocol (network interrupt,
    /// protocol violation, reset).
    pub fn abnormal(message: impl Into<String>) -> Self {
        Self {
            abnormal: true,
            message: message.into(),
        }
    }

    /// An error raised once the close handshake has already completed.
    pub fn clean_close(message: impl Into<String>) -> Self {
        Self {
            abnormal: false,
            message: message.into(),
        }
    }
}

/// The write half of one socket.
#[async_trait]
pub trait ConnSink: Send {
    /// Sends one text frame.
    async fn send_text(&mut self, data: &[u8]) -> Result<(), ConnError>;

    /// Closes the socket, completing the close handshake if possible.
    async fn close(&mut self) -> Result<(), ConnError>;
}

/// The read half of one socket.
#[async_trait]
pub trait ConnStream: Send {
    /// Waits for the next frame. `None` means the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, ConnError>>;
}

/// One established socket, split into its two halves.
pub struct Connection {
    pub sink: Box<dyn ConnSink>,
    pub stream: Box<dyn ConnStream>,
}

/// Establishes sockets. One dial, one socket; retrying is the transport's
/// job, not the dialer's.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, url: &str) -> Result<Connection, ConnError>;
}

#[async_trait]
impl<T: Dialer + ?Sized> Dialer for Arc<T> {
    async fn dial(&self, url: &str) -> Result<Connection, ConnError> {
        (**self).dial(url).await
    }
}

/// A resilient bidirectional text-frame channel.
///
/// Implementations own one underlying socket at a time and deliver every
/// inbound text frame to the single registered read handler.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Dials `url` with backoff, replacing any existing socket. All writes
    /// before the first successful connect fail.
    async fn connect(&self, url: &str) -> Result<(), FleetError>;

    /// Sends one text frame, retrying and (on repeated abnormal failures)
    /// reconnecting per the transport's recovery rules.
    async fn write(&self, data: &[u8]) -> Result<(), FleetError>;

    /// Registers the handler inbound text frames are dispatched to.
    fn set_read_handler(&self, handler: ReadHandler);

    /// Re-establishes the socket against the last connect URL. Safe to call
    /// concurrently; only one dial happens.
    async fn reconnect(&self) -> Result<(), FleetError>;

    /// Closes the socket. All writes after close fail.
    async fn close(&self) -> Result<(), FleetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_error_classification() {
        assert!(ConnError::abnormal("reset").abnormal);
        assert!(!ConnError::clean_close("closed").abnormal);
    }

    #[test]
    fn test_conn_error_display_is_message() {
        let err = ConnError::abnormal("connection reset by peer");
        assert_eq!(err.to_string(), "connection reset by peer");
    }
}
