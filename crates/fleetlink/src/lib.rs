//! # fleetlink
//!
//! Game-server SDK for a managed fleet service. A server process
//! initializes the SDK once, reports itself ready, and from then on the
//! SDK maintains a single long-lived WebSocket to the control plane:
//! lifecycle notifications (create/update/terminate game session) flow in
//! to user callbacks, request/response operations (player sessions,
//! backfill, credentials, certificate) flow out, and a heartbeat loop
//! reports health in between.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use fleetlink::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), FleetError> {
//! init_sdk(ServerParameters {
//!     websocket_url: "wss://gateway.example".into(),
//!     process_id: "process-1".into(),
//!     host_id: "host-1".into(),
//!     fleet_id: "fleet-1".into(),
//!     auth_token: "token".into(),
//!     ..Default::default()
//! })
//! .await?;
//!
//! process_ready(ProcessParameters {
//!     port: 7777,
//!     on_start_game_session: Some(Arc::new(|_session| {
//!         // spin up the match
//!     })),
//!     on_health_check: Some(Arc::new(|| true)),
//!     ..Default::default()
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod client;
pub mod config;
mod manager;
mod params;
mod state;

pub use api::{
    accept_player_session, activate_game_session, describe_player_sessions, destroy,
    get_compute_certificate, get_fleet_role_credentials, get_game_session_id, get_sdk_version,
    get_termination_time, init_sdk, init_sdk_from_environment, process_ending, process_ready,
    remove_player_session, start_match_backfill, stop_match_backfill,
    update_player_session_creation_policy,
};
pub use client::{ActionHandler, WebsocketClient};
pub use manager::{Manager, MessageHandlers};
pub use params::{
    LogParameters, OnHealthCheck, OnProcessTerminate, OnStartGameSession, OnUpdateGameSession,
    ProcessParameters, ServerParameters,
};
pub use state::ServerState;

/// Re-exports everything a game server needs.
pub mod prelude {
    pub use crate::{
        accept_player_session, activate_game_session, describe_player_sessions, destroy,
        get_compute_certificate, get_fleet_role_credentials, get_game_session_id,
        get_sdk_version, get_termination_time, init_sdk, init_sdk_from_environment,
        process_ending, process_ready, remove_player_session, start_match_backfill,
        stop_match_backfill, update_player_session_creation_policy,
    };
    pub use crate::{LogParameters, ProcessParameters, ServerParameters, ServerState};

    pub use fleetlink_protocol::model::{
        AttributeValue, GameSession, MatchmakerData, Player, PlayerSession,
        PlayerSessionCreationPolicy, PlayerSessionStatus, UpdateGameSession, UpdateReason,
    };
    pub use fleetlink_protocol::request::{
        DescribePlayerSessionsRequest, GetFleetRoleCredentialsRequest, StartMatchBackfillRequest,
        StopMatchBackfillRequest,
    };
    pub use fleetlink_protocol::result::{
        DescribePlayerSessionsResult, GetComputeCertificateResult, GetFleetRoleCredentialsResult,
        StartMatchBackfillResult,
    };
    pub use fleetlink_protocol::{ErrorKind, FleetError};
}
