//! Parsing of the matchmaker document.
//!
//! The service delivers matchmaking context as a JSON *string* inside
//! the game session (`MatchmakerData` field). The document groups players
//! by team; this module flattens it into a per-player list so it can be
//! fed straight back into a start-match-backfill request.

use std::collections::HashMap;

use serde::Deserialize;

use super::{AttributeValue, Player};
use crate::{ErrorKind, FleetError};

/// The flattened matchmaker document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchmakerData {
    /// The unique identifier for this group of matched profiles.
    pub match_id: String,

    /// ARN of the matchmaking configuration used for this match.
    pub matchmaking_configuration_arn: String,

    /// All players currently in the game session, with their team stamped.
    pub players: Vec<Player>,

    /// The ticket id of the automatic backfill request, when one exists.
    pub auto_backfill_ticket_id: String,
}

// The raw document shape, camelCase as the matchmaker emits it.

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(rename = "matchId", default)]
    match_id: String,
    #[serde(rename = "matchmakingConfigurationArn", default)]
    matchmaking_configuration_arn: String,
    #[serde(rename = "teams", default)]
    teams: Vec<RawTeam>,
    #[serde(rename = "autoBackfillTicketId", default)]
    auto_backfill_ticket_id: String,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    #[serde(rename = "name", default)]
    name: String,
    #[serde(rename = "players", default)]
    players: Vec<RawPlayer>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(rename = "playerId", default)]
    player_id: String,
    #[serde(rename = "attributes", default)]
    attributes: HashMap<String, RawAttribute>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    #[serde(rename = "valueAttribute", default)]
    value_attribute: serde_json::Value,
}

impl MatchmakerData {
    /// Parses a matchmaker document from the JSON string carried by a game
    /// session. An empty string yields the default (empty) value.
    pub fn parse(document: &str) -> Result<Self, FleetError> {
        if document.is_empty() {
            return Ok(Self::default());
        }
        let raw: RawDocument = serde_json::from_str(document).map_err(|e| {
            FleetError::with_message(
                ErrorKind::InternalService,
                format!("failed to parse matchmaker data: {e}"),
            )
        })?;

        let mut players = Vec::new();
        for team in raw.teams {
            for raw_player in team.players {
                players.push(Player {
                    player_id: raw_player.player_id,
                    team: team.name.clone(),
                    player_attributes: raw_player
                        .attributes
                        .iter()
                        .map(|(key, attr)| {
                            (key.clone(), AttributeValue::from_json(&attr.value_attribute))
                        })
                        .collect(),
                    latency_in_ms: HashMap::new(),
                });
            }
        }

        Ok(Self {
            match_id: raw.match_id,
            matchmaking_configuration_arn: raw.matchmaking_configuration_arn,
            players,
            auto_backfill_ticket_id: raw.auto_backfill_ticket_id,
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
