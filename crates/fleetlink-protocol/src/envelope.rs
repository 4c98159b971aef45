//! The message envelope common to every wire frame.
//!
//! Every frame exchanged with the service carries at least an `Action`
//! (which operation or notification this is) and a `RequestId` (a UUID
//! string matching responses to requests). Response frames additionally
//! carry a `StatusCode` and `ErrorMessage`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status code of a successful response frame.
pub const STATUS_OK: u16 = 200;

/// The closed set of actions that travel on the wire.
///
/// Serialized as the exact PascalCase action name; a frame with any other
/// action string fails envelope decoding and is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    AcceptPlayerSession,
    ActivateGameSession,
    TerminateServerProcess,
    ActivateServerProcess,
    UpdatePlayerSessionCreationPolicy,
    CreateGameSession,
    UpdateGameSession,
    StartMatchBackfill,
    TerminateProcess,
    DescribePlayerSessions,
    StopMatchBackfill,
    HeartbeatServerProcess,
    GetComputeCertificate,
    GetFleetRoleCredentials,
    RefreshConnection,
    RemovePlayerSession,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The `{Action, RequestId}` prefix shared by every message.
///
/// Request types embed this via `#[serde(flatten)]` so the envelope fields
/// sit at the top level of the JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Which operation or notification this frame is.
    #[serde(rename = "Action")]
    pub action: Action,

    /// Unique id matching a response to its request. Empty on frames the
    /// service originates without a correlated request.
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
}

impl Message {
    /// Creates an envelope for `action` with a fresh UUID request id.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// The envelope view of an inbound frame.
///
/// Only these fields are decoded when routing a frame; the full payload is
/// handed on as raw bytes to whichever waiter or handler claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(flatten)]
    pub message: Message,

    /// HTTP-style status; absent on asynchronous notifications (decodes as 0).
    #[serde(rename = "StatusCode", default)]
    pub status_code: u16,

    /// Peer-supplied failure description; empty on success.
    #[serde(rename = "ErrorMessage", default)]
    pub error_message: String,
}

/// Implemented by every outbound request so the client can read the
/// envelope without knowing the concrete type.
pub trait Request: Serialize {
    /// The `{Action, RequestId}` envelope of this request.
    fn envelope(&self) -> &Message;

    /// The request id, used to key the pending-request table.
    fn request_id(&self) -> &str {
        &self.envelope().request_id
    }

    /// The action name, used for logging.
    fn action(&self) -> Action {
        self.envelope().action
    }
}

// =========================================================================
// Tests
// =========================================================================
