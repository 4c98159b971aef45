//! The SDK-wide error taxonomy.
//!
//! Every layer of the SDK reports failures as a [`FleetError`]: a closed
//! [`ErrorKind`] plus a human-readable name and message. Each kind carries a
//! catalogued default name/message; constructors accept overrides for the
//! cases where a caller has something more specific to say.
//!
//! The taxonomy lives in the protocol crate because the kinds are part of
//! the contract with the service — in particular the mapping from peer
//! status codes (4xx → [`ErrorKind::BadRequest`], any other non-200 →
//! [`ErrorKind::InternalService`]).

use std::borrow::Cow;

/// The closed set of failure kinds the SDK produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The SDK has already been initialized.
    AlreadyInitialized,
    /// The SDK (or its connection) has not been initialized yet.
    NotInitialized,
    /// The operation needs a ready process (`process_ready` not called or failed).
    ProcessNotReady,
    /// The `process_ready` call to the service failed.
    ProcessReadyFailed,
    /// The `process_ending` call to the service failed.
    ProcessEndingFailed,
    /// No game session is bound to this process yet.
    GameSessionIdNotSet,
    /// The peer rejected the request (4xx), or the request was malformed locally.
    BadRequest,
    /// The peer failed (non-200, non-4xx), or an internal invariant broke.
    InternalService,
    /// A service call failed, typically by timing out waiting for the response.
    ServiceCallFailed,
    /// The connect backoff schedule was exhausted without a successful dial.
    WebsocketConnectFailure,
    /// A write failed permanently.
    WebsocketSendMessageFailure,
    /// A write failed even after the retry decorator's attempts.
    WebsocketRetriableSendMessageFailure,
    /// Closing the socket raised an error.
    WebsocketClosingError,
    /// The manager could not establish the local connection.
    LocalConnectionFailed,
    /// The network layer was never set up.
    NetworkNotInitialized,
    /// No terminate-process notification has been received.
    TerminationTimeNotSet,
}

impl ErrorKind {
    /// The catalogued name for this kind.
    pub fn default_name(self) -> &'static str {
        match self {
            ErrorKind::AlreadyInitialized => "Already Initialized",
            ErrorKind::NotInitialized => "Not Initialized",
            ErrorKind::ProcessNotReady => "Process not ready.",
            ErrorKind::ProcessReadyFailed => "Process ready failed.",
            ErrorKind::ProcessEndingFailed => "Process ending failed.",
            ErrorKind::GameSessionIdNotSet => "GameSession id is not set.",
            ErrorKind::BadRequest => "Bad request exception.",
            ErrorKind::InternalService => "Internal service exception.",
            ErrorKind::ServiceCallFailed => "Service call failed.",
            ErrorKind::WebsocketConnectFailure => "WebSocket Connection Failed",
            ErrorKind::WebsocketSendMessageFailure => "WebSocket Send Message Failed",
            ErrorKind::WebsocketRetriableSendMessageFailure => "WebSocket Send Message Failed",
            ErrorKind::WebsocketClosingError => "WebSocket close error",
            ErrorKind::LocalConnectionFailed => "Local connection failed.",
            ErrorKind::NetworkNotInitialized => "Network not initialized.",
            ErrorKind::TerminationTimeNotSet => "TerminationTime is not set.",
        }
    }

    /// The catalogued message for this kind.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::AlreadyInitialized => {
                "The SDK has already been initialized. Call destroy() before reinitializing."
            }
            ErrorKind::NotInitialized => {
                "The SDK has not been initialized. Call init_sdk() before making SDK calls."
            }
            ErrorKind::ProcessNotReady => {
                "The process has not yet been activated by calling process_ready(). \
                 Processes in standby cannot receive start-game-session callbacks."
            }
            ErrorKind::ProcessReadyFailed => "The process_ready call to the service failed.",
            ErrorKind::ProcessEndingFailed => "The process_ending call to the service failed.",
            ErrorKind::GameSessionIdNotSet => "No game sessions are bound to this process.",
            ErrorKind::BadRequest => "Bad request exception.",
            ErrorKind::InternalService => "Internal service exception.",
            ErrorKind::ServiceCallFailed => {
                "A service call has failed. See the root cause error for more information."
            }
            ErrorKind::WebsocketConnectFailure => {
                "Connection to the service WebSocket has failed"
            }
            ErrorKind::WebsocketSendMessageFailure
            | ErrorKind::WebsocketRetriableSendMessageFailure => {
                "Sending message to the service WebSocket has failed"
            }
            ErrorKind::WebsocketClosingError => {
                "An error has occurred in closing the connection"
            }
            ErrorKind::LocalConnectionFailed => {
                "Connection to the local agent could not be established."
            }
            ErrorKind::NetworkNotInitialized => {
                "Local network was not initialized. Have you called init_sdk()?"
            }
            ErrorKind::TerminationTimeNotSet => {
                "TerminationTime has not been sent to this process."
            }
        }
    }

    /// Maps a peer status code to the kind it represents.
    ///
    /// All 4xx codes collapse to [`ErrorKind::BadRequest`]; every other
    /// non-200 code is an [`ErrorKind::InternalService`].
    pub fn from_status_code(status: u16) -> Self {
        if (400..500).contains(&status) {
            ErrorKind::BadRequest
        } else {
            ErrorKind::InternalService
        }
    }
}

/// An error produced by the SDK.
///
/// Name and message are resolved at construction: an override wins, the
/// kind's catalogued text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[FleetError: kind={kind:?}, name={name}, message={message}]")]
pub struct FleetError {
    /// Which member of the taxonomy this is.
    pub kind: ErrorKind,
    name: Cow<'static, str>,
    message: Cow<'static, str>,
}

impl FleetError {
    /// Creates an error with the kind's catalogued name and message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            name: Cow::Borrowed(kind.default_name()),
            message: Cow::Borrowed(kind.default_message()),
        }
    }

    /// Creates an error with an overridden message.
    ///
    /// An empty override falls back to the catalogued message.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            name: Cow::Borrowed(kind.default_name()),
            message: if message.is_empty() {
                Cow::Borrowed(kind.default_message())
            } else {
                Cow::Owned(message)
            },
        }
    }

    /// Creates an error with both name and message overridden.
    pub fn with_name_message(
        kind: ErrorKind,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let mut err = Self::with_message(kind, message);
        if !name.is_empty() {
            err.name = Cow::Owned(name);
        }
        err
    }

    /// Builds the error for a non-200 response frame.
    pub fn from_status_code(status: u16, error_message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::from_status_code(status), error_message)
    }

    /// The error's name (overridden or catalogued).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The error's message (overridden or catalogued).
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The resolution of a pending request: the raw response payload, or the
/// error the peer (or the SDK itself) produced for it.
pub type Outcome = Result<Vec<u8>, FleetError>;

// =========================================================================
// Tests
// =========================================================================
