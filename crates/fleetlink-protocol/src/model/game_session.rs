//! Game-session records and the update-notification payload.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Current status of a game session.
///
/// Unrecognized strings decode as [`GameSessionStatus::NotSet`] rather than
/// failing the whole payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameSessionStatus {
    #[default]
    NotSet,
    Active,
    Activating,
    Terminated,
    Terminating,
}

impl<'de> Deserialize<'de> for GameSessionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match String::deserialize(deserializer)?.as_str() {
            "ACTIVE" => GameSessionStatus::Active,
            "ACTIVATING" => GameSessionStatus::Activating,
            "TERMINATED" => GameSessionStatus::Terminated,
            "TERMINATING" => GameSessionStatus::Terminating,
            _ => GameSessionStatus::NotSet,
        })
    }
}

/// The stateful unit a server process hosts at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameSession {
    /// A unique identifier for the game session.
    #[serde(rename = "GameSessionId", default)]
    pub game_session_id: String,

    /// Custom game session properties, formatted as a single string value.
    #[serde(rename = "GameSessionData", default)]
    pub game_session_data: String,

    /// A descriptive label associated with the game session.
    #[serde(rename = "Name", default)]
    pub name: String,

    /// The matchmaker document for this session, as a JSON string. Parse it
    /// with [`MatchmakerData::parse`](crate::model::MatchmakerData::parse)
    /// when requesting backfills.
    #[serde(rename = "MatchmakerData", default)]
    pub matchmaker_data: String,

    /// The fleet this session runs on. Stamped by the SDK before the
    /// start-session callback fires.
    #[serde(rename = "FleetId", default)]
    pub fleet_id: String,

    /// The fleet location hosting the session (a region code).
    #[serde(rename = "Location", default)]
    pub location: String,

    /// The maximum number of simultaneously connected players.
    #[serde(rename = "MaximumPlayerSessionCount", default)]
    pub maximum_player_session_count: u32,

    /// The IP address players connect to.
    #[serde(rename = "IpAddress", default)]
    pub ip_address: String,

    /// The port players connect to.
    #[serde(rename = "Port", default)]
    pub port: u16,

    /// The DNS identifier of the hosting instance.
    #[serde(rename = "DnsName", default)]
    pub dns_name: String,

    /// Custom key/value properties passed with the create request.
    #[serde(rename = "GameProperties", default)]
    pub game_properties: HashMap<String, String>,

    /// Current session status, when the service supplied one.
    #[serde(rename = "Status", skip_serializing_if = "Option::is_none", default)]
    pub status: Option<GameSessionStatus>,

    /// Additional status detail (e.g. an interrupted spot instance).
    #[serde(rename = "StatusReason", default)]
    pub status_reason: String,
}

/// Why an update-game-session notification was delivered.
///
/// Unrecognized strings decode as [`UpdateReason::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateReason {
    #[default]
    Unknown,
    MatchmakingDataUpdated,
    BackfillFailed,
    BackfillTimedOut,
    BackfillCancelled,
}

impl<'de> Deserialize<'de> for UpdateReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match String::deserialize(deserializer)?.as_str() {
            "MATCHMAKING_DATA_UPDATED" => UpdateReason::MatchmakingDataUpdated,
            "BACKFILL_FAILED" => UpdateReason::BackfillFailed,
            "BACKFILL_TIMED_OUT" => UpdateReason::BackfillTimedOut,
            "BACKFILL_CANCELLED" => UpdateReason::BackfillCancelled,
            _ => UpdateReason::Unknown,
        })
    }
}

/// The payload of an update-game-session notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UpdateGameSession {
    /// The matchmaking or backfill ticket this update belongs to.
    #[serde(rename = "BackfillTicketId", default)]
    pub backfill_ticket_id: String,

    /// The updated game session object.
    #[serde(rename = "GameSession", default)]
    pub game_session: GameSession,

    /// The reason this update was supplied, when the service sent one.
    #[serde(rename = "UpdateReason", skip_serializing_if = "Option::is_none", default)]
    pub update_reason: Option<UpdateReason>,
}

// =========================================================================
// Tests
// =========================================================================
