//! Player and player-session records.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::AttributeValue;

/// A player as known to the matchmaker: identity, team, attributes, and
/// optionally per-region latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Player {
    /// A unique identifier for the player.
    #[serde(rename = "PlayerId", default)]
    pub player_id: String,

    /// The team the player is assigned to in a match.
    #[serde(rename = "Team", default)]
    pub team: String,

    /// Key/value player information used in matchmaking, e.g.
    /// `{"skill": {"AttrType": "DOUBLE", "N": 23.0}}`.
    #[serde(rename = "PlayerAttributes", default)]
    pub player_attributes: HashMap<String, AttributeValue>,

    /// Observed latency per region, in milliseconds. When present, the
    /// matchmaker only places the match in regions with reported latency.
    #[serde(rename = "LatencyInMs", default)]
    pub latency_in_ms: HashMap<String, u32>,
}

/// Current status of a player session.
///
/// Unrecognized strings decode as [`PlayerSessionStatus::NotSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerSessionStatus {
    #[default]
    NotSet,
    /// Reserved but the player has not connected or been validated yet.
    Reserved,
    /// Validated by the server process and currently connected.
    Active,
    /// The player connection has been dropped.
    Completed,
    /// The player never connected within the timeout limit.
    Timedout,
}

impl<'de> Deserialize<'de> for PlayerSessionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match String::deserialize(deserializer)?.as_str() {
            "RESERVED" => PlayerSessionStatus::Reserved,
            "ACTIVE" => PlayerSessionStatus::Active,
            "COMPLETED" => PlayerSessionStatus::Completed,
            "TIMEDOUT" => PlayerSessionStatus::Timedout,
            _ => PlayerSessionStatus::NotSet,
        })
    }
}

/// A reserved slot for one player inside a game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerSession {
    #[serde(rename = "PlayerId", default)]
    pub player_id: String,

    #[serde(rename = "PlayerSessionId", default)]
    pub player_session_id: String,

    #[serde(rename = "GameSessionId", default)]
    pub game_session_id: String,

    #[serde(rename = "FleetId", default)]
    pub fleet_id: String,

    /// Developer-defined information related to the player; opaque to the
    /// service.
    #[serde(rename = "PlayerData", default)]
    pub player_data: String,

    #[serde(rename = "IpAddress", default)]
    pub ip_address: String,

    #[serde(rename = "Port", default)]
    pub port: u16,

    /// Creation time, Unix milliseconds.
    #[serde(rename = "CreationTime", default)]
    pub creation_time: i64,

    /// Termination time, Unix milliseconds; 0 while the session lives.
    #[serde(rename = "TerminationTime", default)]
    pub termination_time: i64,

    #[serde(rename = "DnsName", default)]
    pub dns_name: String,

    #[serde(rename = "Status", skip_serializing_if = "Option::is_none", default)]
    pub status: Option<PlayerSessionStatus>,
}

/// Whether a game session is accepting new players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerSessionCreationPolicy {
    #[default]
    NotSet,
    DenyAll,
    AcceptAll,
}

impl<'de> Deserialize<'de> for PlayerSessionCreationPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match String::deserialize(deserializer)?.as_str() {
            "DENY_ALL" => PlayerSessionCreationPolicy::DenyAll,
            "ACCEPT_ALL" => PlayerSessionCreationPolicy::AcceptAll,
            _ => PlayerSessionCreationPolicy::NotSet,
        })
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_session_json_field_names() {
        let session = PlayerSession {
            player_id: "p-1".into(),
            player_session_id: "psess-1".into(),
            game_session_id: "gs-1".into(),
            status: Some(PlayerSessionStatus::Reserved),
            ..Default::default()
        };
        let json: serde_json::Value = serde_json::to_value(&session).unwrap();
        assert_eq!(json["PlayerId"], "p-1");
        assert_eq!(json["PlayerSessionId"], "psess-1");
        assert_eq!(json["GameSessionId"], "gs-1");
        assert_eq!(json["Status"], "RESERVED");
    }

    #[test]
    fn test_player_session_status_unknown_decodes_as_not_set() {
        let status: PlayerSessionStatus = serde_json::from_str("\"WANDERING\"").unwrap();
        assert_eq!(status, PlayerSessionStatus::NotSet);
    }

    #[test]
    fn test_creation_policy_wire_names() {
        assert_eq!(
            serde_json::to_string(&PlayerSessionCreationPolicy::AcceptAll).unwrap(),
            "\"ACCEPT_ALL\""
        );
        assert_eq!(
            serde_json::to_string(&PlayerSessionCreationPolicy::DenyAll).unwrap(),
            "\"DENY_ALL\""
        );
        let policy: PlayerSessionCreationPolicy =
            serde_json::from_str("\"ACCEPT_ALL\"").unwrap();
        assert_eq!(policy, PlayerSessionCreationPolicy::AcceptAll);
    }

    #[test]
    fn test_player_round_trip_with_attributes_and_latency() {
        let player = Player {
            player_id: "p-2".into(),
            team: "red".into(),
            player_attributes: HashMap::from([
                ("skill".to_string(), AttributeValue::Double { n: 23.0 }),
                (
                    "gameMode".to_string(),
                    AttributeValue::String {
                        s: "deathmatch".into(),
                    },
                ),
            ]),
            latency_in_ms: HashMap::from([("us-east-1".to_string(), 40)]),
        };
        let bytes = serde_json::to_vec(&player).unwrap();
        let decoded: Player = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(player, decoded);
    }
}
