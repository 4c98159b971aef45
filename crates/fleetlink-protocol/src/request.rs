//! Outbound request types, one per action the SDK originates.
//!
//! Every request embeds a [`Message`] envelope (flattened, so `Action` and
//! `RequestId` sit at the top level of the JSON object) and gets a fresh
//! UUID request id from its constructor. Optional string fields use
//! `skip_serializing_if` so absent values stay off the wire.

use serde::Serialize;

use crate::model::{Player, PlayerSessionCreationPolicy};
use crate::{Action, Message, Request};

fn is_empty(value: &str) -> bool {
    value.is_empty()
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Reports the process ready to host a game session.
#[derive(Debug, Clone, Serialize)]
pub struct ActivateServerProcessRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "SdkVersion")]
    pub sdk_version: String,

    #[serde(rename = "SdkLanguage")]
    pub sdk_language: String,

    #[serde(rename = "Port")]
    pub port: u16,

    #[serde(rename = "LogPaths")]
    pub log_paths: Vec<String>,
}

impl ActivateServerProcessRequest {
    pub fn new(sdk_version: impl Into<String>, sdk_language: impl Into<String>, port: u16) -> Self {
        Self {
            message: Message::new(Action::ActivateServerProcess),
            sdk_version: sdk_version.into(),
            sdk_language: sdk_language.into(),
            port,
            log_paths: Vec::new(),
        }
    }
}

/// Reports the current game session as active.
#[derive(Debug, Clone, Serialize)]
pub struct ActivateGameSessionRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "GameSessionId", skip_serializing_if = "is_empty")]
    pub game_session_id: String,
}

impl ActivateGameSessionRequest {
    pub fn new(game_session_id: impl Into<String>) -> Self {
        Self {
            message: Message::new(Action::ActivateGameSession),
            game_session_id: game_session_id.into(),
        }
    }
}

/// Accepts a player whose session was reserved for this game session.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptPlayerSessionRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "GameSessionId", skip_serializing_if = "is_empty")]
    pub game_session_id: String,

    #[serde(rename = "PlayerSessionId", skip_serializing_if = "is_empty")]
    pub player_session_id: String,
}

impl AcceptPlayerSessionRequest {
    pub fn new(
        game_session_id: impl Into<String>,
        player_session_id: impl Into<String>,
    ) -> Self {
        Self {
            message: Message::new(Action::AcceptPlayerSession),
            game_session_id: game_session_id.into(),
            player_session_id: player_session_id.into(),
        }
    }
}

/// Drops a player session from the current game session.
#[derive(Debug, Clone, Serialize)]
pub struct RemovePlayerSessionRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "GameSessionId", skip_serializing_if = "is_empty")]
    pub game_session_id: String,

    #[serde(rename = "PlayerSessionId", skip_serializing_if = "is_empty")]
    pub player_session_id: String,
}

impl RemovePlayerSessionRequest {
    pub fn new(
        game_session_id: impl Into<String>,
        player_session_id: impl Into<String>,
    ) -> Self {
        Self {
            message: Message::new(Action::RemovePlayerSession),
            game_session_id: game_session_id.into(),
            player_session_id: player_session_id.into(),
        }
    }
}

/// Changes whether the game session accepts new players.
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePlayerSessionCreationPolicyRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "GameSessionId", skip_serializing_if = "is_empty")]
    pub game_session_id: String,

    #[serde(rename = "PlayerSessionPolicy")]
    pub player_session_policy: PlayerSessionCreationPolicy,
}

impl UpdatePlayerSessionCreationPolicyRequest {
    pub fn new(game_session_id: impl Into<String>, policy: PlayerSessionCreationPolicy) -> Self {
        Self {
            message: Message::new(Action::UpdatePlayerSessionCreationPolicy),
            game_session_id: game_session_id.into(),
            player_session_policy: policy,
        }
    }
}

/// Queries player sessions, optionally filtered and paged.
#[derive(Debug, Clone, Serialize)]
pub struct DescribePlayerSessionsRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "GameSessionId", skip_serializing_if = "is_empty")]
    pub game_session_id: String,

    #[serde(rename = "PlayerId", skip_serializing_if = "is_empty")]
    pub player_id: String,

    #[serde(rename = "PlayerSessionId", skip_serializing_if = "is_empty")]
    pub player_session_id: String,

    /// One of `RESERVED`, `ACTIVE`, `COMPLETED`, `TIMEDOUT`.
    #[serde(rename = "PlayerSessionStatusFilter", skip_serializing_if = "is_empty")]
    pub player_session_status_filter: String,

    /// Paging token from a previous call; empty for the first page.
    #[serde(rename = "NextToken", skip_serializing_if = "is_empty")]
    pub next_token: String,

    /// Maximum number of results per page.
    #[serde(rename = "Limit", skip_serializing_if = "is_zero")]
    pub limit: u32,
}

impl DescribePlayerSessionsRequest {
    pub fn new() -> Self {
        Self {
            message: Message::new(Action::DescribePlayerSessions),
            game_session_id: String::new(),
            player_id: String::new(),
            player_session_id: String::new(),
            player_session_status_filter: String::new(),
            next_token: String::new(),
            limit: 0,
        }
    }
}

impl Default for DescribePlayerSessionsRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests more matched players for the ongoing game session.
#[derive(Debug, Clone, Serialize)]
pub struct StartMatchBackfillRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "GameSessionArn", skip_serializing_if = "is_empty")]
    pub game_session_arn: String,

    #[serde(rename = "MatchmakingConfigurationArn", skip_serializing_if = "is_empty")]
    pub matchmaking_configuration_arn: String,

    /// Ticket id to track the backfill; the service generates one when empty.
    #[serde(rename = "TicketId")]
    pub ticket_id: String,

    /// All players currently assigned to the game session.
    #[serde(rename = "Players")]
    pub players: Vec<Player>,
}

impl StartMatchBackfillRequest {
    pub fn new(
        game_session_arn: impl Into<String>,
        matchmaking_configuration_arn: impl Into<String>,
        players: Vec<Player>,
    ) -> Self {
        Self {
            message: Message::new(Action::StartMatchBackfill),
            game_session_arn: game_session_arn.into(),
            matchmaking_configuration_arn: matchmaking_configuration_arn.into(),
            ticket_id: String::new(),
            players,
        }
    }
}

/// Cancels an in-flight match backfill ticket.
#[derive(Debug, Clone, Serialize)]
pub struct StopMatchBackfillRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "GameSessionArn", skip_serializing_if = "is_empty")]
    pub game_session_arn: String,

    #[serde(rename = "MatchmakingConfigurationArn", skip_serializing_if = "is_empty")]
    pub matchmaking_configuration_arn: String,

    #[serde(rename = "TicketId", skip_serializing_if = "is_empty")]
    pub ticket_id: String,
}

impl StopMatchBackfillRequest {
    pub fn new() -> Self {
        Self {
            message: Message::new(Action::StopMatchBackfill),
            game_session_arn: String::new(),
            matchmaking_configuration_arn: String::new(),
            ticket_id: String::new(),
        }
    }
}

impl Default for StopMatchBackfillRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Reports process health on each heartbeat.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatServerProcessRequest {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "HealthStatus")]
    pub health_status: bool,
}

impl HeartbeatServerProcessRequest {
    pub fn new(health_status: bool) -> Self {
        Self {
            message: Message::new(Action::HeartbeatServerProcess),
            health_status,
        }
    }
}

/// Announces that this process is shutting down.
#[derive(Debug, Clone, Serialize)]
pub struct TerminateServerProcessRequest {
    #[serde(flatten)]
    pub message: Message,
}

impl TerminateServerProcessRequest {
    pub fn new() -> Self {
        Self {
            message: Message::new(Action::TerminateServerProcess),
        }
    }
}

impl Default for TerminateServerProcessRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches the TLS certificate location for this compute.
#[derive(Debug, Clone, Serialize)]
pub struct GetComputeCertificateRequest {
    #[serde(flatten)]
    pub message: Message,
}

impl GetComputeCertificateRequest {
    pub fn new() -> Self {
        Self {
            message: Message::new(Action::GetComputeCertificate),
        }
    }
}

impl Default for GetComputeCertificateRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Assumes the fleet role and returns short-lived credentials.
#[derive(Debug, Clone, Serialize)]
pub struct GetFleetRoleCredentialsRequest {
    #[serde(flatten)]
    pub message: Message,

    /// ARN of the role to assume.
    #[serde(rename = "RoleArn", skip_serializing_if = "is_empty")]
    pub role_arn: String,

    /// Session name for the assumed role; defaulted by the SDK when empty.
    #[serde(rename = "RoleSessionName", skip_serializing_if = "is_empty")]
    pub role_session_name: String,
}

impl GetFleetRoleCredentialsRequest {
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            message: Message::new(Action::GetFleetRoleCredentials),
            role_arn: role_arn.into(),
            role_session_name: String::new(),
        }
    }
}

macro_rules! impl_request {
    ($($ty:ty),* $(,)?) => {
        $(impl Request for $ty {
            fn envelope(&self) -> &Message {
                &self.message
            }
        })*
    };
}

impl_request!(
    ActivateServerProcessRequest,
    ActivateGameSessionRequest,
    AcceptPlayerSessionRequest,
    RemovePlayerSessionRequest,
    UpdatePlayerSessionCreationPolicyRequest,
    DescribePlayerSessionsRequest,
    StartMatchBackfillRequest,
    StopMatchBackfillRequest,
    HeartbeatServerProcessRequest,
    TerminateServerProcessRequest,
    GetComputeCertificateRequest,
    GetFleetRoleCredentialsRequest,
);

// =========================================================================
// Tests
// =========================================================================
