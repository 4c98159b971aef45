//! Inbound asynchronous notification payloads.
//!
//! These four messages arrive without a correlated outbound request and are
//! routed by action to the handlers the manager installs at connect time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{GameSession, UpdateGameSession};
use crate::Message;

/// Orders this process to host a new game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGameSessionMessage {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "MaximumPlayerSessionCount", default)]
    pub maximum_player_session_count: u32,

    #[serde(rename = "Port", default)]
    pub port: u16,

    #[serde(rename = "IpAddress", default)]
    pub ip_address: String,

    #[serde(rename = "GameSessionId", default)]
    pub game_session_id: String,

    #[serde(rename = "GameSessionName", default)]
    pub game_session_name: String,

    #[serde(rename = "GameSessionData", default)]
    pub game_session_data: String,

    #[serde(rename = "MatchmakerData", default)]
    pub matchmaker_data: String,

    #[serde(rename = "DnsName", default)]
    pub dns_name: String,

    #[serde(rename = "GameProperties", default)]
    pub game_properties: HashMap<String, String>,
}

impl From<CreateGameSessionMessage> for GameSession {
    fn from(msg: CreateGameSessionMessage) -> Self {
        GameSession {
            game_session_id: msg.game_session_id,
            game_session_data: msg.game_session_data,
            name: msg.game_session_name,
            matchmaker_data: msg.matchmaker_data,
            maximum_player_session_count: msg.maximum_player_session_count,
            ip_address: msg.ip_address,
            port: msg.port,
            dns_name: msg.dns_name,
            game_properties: msg.game_properties,
            ..Default::default()
        }
    }
}

/// Carries updated session details, usually after a backfill transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateGameSessionMessage {
    #[serde(flatten)]
    pub message: Message,

    #[serde(flatten)]
    pub update: UpdateGameSession,
}

/// Orders this process to shut down by the given deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminateProcessMessage {
    #[serde(flatten)]
    pub message: Message,

    /// Termination deadline, Unix milliseconds.
    #[serde(rename = "TerminationTime", default)]
    pub termination_time: i64,
}

/// Orders the SDK to re-establish its connection against a new endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConnectionMessage {
    #[serde(flatten)]
    pub message: Message,

    #[serde(rename = "RefreshConnectionEndpoint", default)]
    pub refresh_connection_endpoint: String,

    #[serde(rename = "AuthToken", default)]
    pub auth_token: String,
}

// =========================================================================
// Tests
// =========================================================================
