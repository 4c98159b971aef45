//! Response payloads for the request/response operations.
//!
//! A response frame carries the envelope fields plus the payload fields of
//! one of these records; unknown envelope fields are ignored on decode, so
//! each record deserializes straight from the full frame.

use serde::{Deserialize, Serialize};

use crate::model::{PlayerSession, MAX_PLAYER_SESSIONS};
use crate::{ErrorKind, FleetError};

/// One page of player sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DescribePlayerSessionsResult {
    /// Token for the next sequential page; empty on the last page.
    #[serde(rename = "NextToken", default)]
    pub next_token: String,

    #[serde(rename = "PlayerSessions", default)]
    pub player_sessions: Vec<PlayerSession>,
}

impl DescribePlayerSessionsResult {
    /// Appends a player session, enforcing the
    /// [`MAX_PLAYER_SESSIONS`] bound.
    pub fn add_player_session(&mut self, session: PlayerSession) -> Result<(), FleetError> {
        if self.player_sessions.len() >= MAX_PLAYER_SESSIONS {
            return Err(FleetError::with_message(
                ErrorKind::BadRequest,
                format!("player session count is at the maximum of {MAX_PLAYER_SESSIONS}"),
            ));
        }
        self.player_sessions.push(session);
        Ok(())
    }
}

/// Ticket for a started match backfill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StartMatchBackfillResult {
    #[serde(rename = "TicketId", default)]
    pub ticket_id: String,
}

/// Location of the compute's TLS certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GetComputeCertificateResult {
    #[serde(rename = "CertificatePath", default)]
    pub certificate_path: String,

    #[serde(rename = "ComputeName", default)]
    pub compute_name: String,
}

/// Short-lived credentials for the fleet role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GetFleetRoleCredentialsResult {
    #[serde(rename = "AssumedRoleUserArn", default)]
    pub assumed_role_user_arn: String,

    #[serde(rename = "AssumedRoleId", default)]
    pub assumed_role_id: String,

    #[serde(rename = "AccessKeyId", default)]
    pub access_key_id: String,

    #[serde(rename = "SecretAccessKey", default)]
    pub secret_access_key: String,

    #[serde(rename = "SessionToken", default)]
    pub session_token: String,

    /// Expiration of the credentials, Unix milliseconds.
    #[serde(rename = "Expiration", default)]
    pub expiration: i64,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_result_decodes_from_full_response_frame() {
        // Envelope fields are present on the wire; the result type ignores
        // them and picks out its own fields.
        let json = r#"{
            "Action": "DescribePlayerSessions",
            "RequestId": "r1",
            "StatusCode": 200,
            "NextToken": "n",
            "PlayerSessions": [{"PlayerId": "p-1", "PlayerSessionId": "psess-1"}]
        }"#;
        let result: DescribePlayerSessionsResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.next_token, "n");
        assert_eq!(result.player_sessions.len(), 1);
        assert_eq!(result.player_sessions[0].player_id, "p-1");
    }

    #[test]
    fn test_add_player_session_rejects_overflow() {
        let mut result = DescribePlayerSessionsResult::default();
        for _ in 0..MAX_PLAYER_SESSIONS {
            result.add_player_session(PlayerSession::default()).unwrap();
        }
        let err = result
            .add_player_session(PlayerSession::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }

    #[test]
    fn test_fleet_role_credentials_decodes_expiration_millis() {
        let json = r#"{
            "Action": "GetFleetRoleCredentials",
            "RequestId": "r2",
            "StatusCode": 200,
            "AccessKeyId": "AKIA",
            "SecretAccessKey": "secret",
            "SessionToken": "tok",
            "Expiration": 1720000000000
        }"#;
        let result: GetFleetRoleCredentialsResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.access_key_id, "AKIA");
        assert_eq!(result.expiration, 1_720_000_000_000);
    }

    #[test]
    fn test_compute_certificate_round_trip() {
        let result = GetComputeCertificateResult {
            certificate_path: "/certs/chain.pem".into(),
            compute_name: "compute-1".into(),
        };
        let bytes = serde_json::to_vec(&result).unwrap();
        let decoded: GetComputeCertificateResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result, decoded);
    }
}
