//! The process-wide façade.
//!
//! Thin convenience functions over one shared [`ServerState`], for game
//! servers that prefer free functions to holding the state object
//! themselves. Every function fails with [`ErrorKind::NotInitialized`]
//! before [`init_sdk`] and after [`destroy`].

use std::sync::{Arc, RwLock};

use fleetlink_protocol::model::PlayerSessionCreationPolicy;
use fleetlink_protocol::request::{
    DescribePlayerSessionsRequest, GetFleetRoleCredentialsRequest, StartMatchBackfillRequest,
    StopMatchBackfillRequest,
};
use fleetlink_protocol::result::{
    DescribePlayerSessionsResult, GetComputeCertificateResult, GetFleetRoleCredentialsResult,
    StartMatchBackfillResult,
};
use fleetlink_protocol::{ErrorKind, FleetError};

use crate::config::{
    env_string_or, env_string_or_missing, ENV_ACCESS_KEY, ENV_AUTH_TOKEN, ENV_AWS_REGION,
    ENV_FLEET_ID, ENV_HOST_ID, ENV_PROCESS_ID, ENV_SECRET_KEY, ENV_SESSION_TOKEN,
    ENV_WEBSOCKET_URL, SDK_VERSION,
};
use crate::params::{ProcessParameters, ServerParameters};
use crate::state::ServerState;

static SERVER_STATE: RwLock<Option<Arc<ServerState>>> = RwLock::new(None);

fn state() -> Result<Arc<ServerState>, FleetError> {
    SERVER_STATE
        .read()
        .expect("server state lock poisoned")
        .clone()
        .ok_or_else(|| FleetError::new(ErrorKind::NotInitialized))
}

/// The version of this SDK.
pub fn get_sdk_version() -> &'static str {
    SDK_VERSION
}

/// Initializes the SDK. Call once at launch, before anything else.
pub async fn init_sdk(params: ServerParameters) -> Result<(), FleetError> {
    if SERVER_STATE
        .read()
        .expect("server state lock poisoned")
        .is_some()
    {
        return Err(FleetError::new(ErrorKind::AlreadyInitialized));
    }

    let state = ServerState::init(params).await?;

    let mut guard = SERVER_STATE.write().expect("server state lock poisoned");
    if guard.is_some() {
        return Err(FleetError::new(ErrorKind::AlreadyInitialized));
    }
    *guard = Some(Arc::new(state));
    Ok(())
}

/// Initializes the SDK entirely from environment variables. The endpoint
/// and identity variables are required; credentials are optional.
pub async fn init_sdk_from_environment() -> Result<(), FleetError> {
    let params = server_params_from_environment().map_err(|e| {
        FleetError::with_name_message(
            ErrorKind::NotInitialized,
            "Could not get server parameters from system environment variables",
            e,
        )
    })?;
    init_sdk(params).await
}

fn server_params_from_environment() -> Result<ServerParameters, String> {
    Ok(ServerParameters {
        websocket_url: env_string_or_missing(ENV_WEBSOCKET_URL)?,
        process_id: env_string_or_missing(ENV_PROCESS_ID)?,
        host_id: env_string_or_missing(ENV_HOST_ID)?,
        fleet_id: env_string_or_missing(ENV_FLEET_ID)?,
        auth_token: env_string_or(ENV_AUTH_TOKEN, ""),
        aws_region: env_string_or(ENV_AWS_REGION, ""),
        access_key: env_string_or(ENV_ACCESS_KEY, ""),
        secret_key: env_string_or(ENV_SECRET_KEY, ""),
        session_token: env_string_or(ENV_SESSION_TOKEN, ""),
    })
}

/// Notifies the service that this process is ready to host game sessions.
pub async fn process_ready(params: ProcessParameters) -> Result<(), FleetError> {
    state()?.process_ready(params).await
}

/// Notifies the service that this process is shutting down.
pub async fn process_ending() -> Result<(), FleetError> {
    state()?.process_ending().await
}

/// Reports the assigned game session active.
pub async fn activate_game_session() -> Result<(), FleetError> {
    state()?.activate_game_session().await
}

/// Changes whether the current game session accepts new players.
pub async fn update_player_session_creation_policy(
    policy: PlayerSessionCreationPolicy,
) -> Result<(), FleetError> {
    state()?.update_player_session_creation_policy(policy).await
}

/// The id of the assigned game session; empty until one is assigned.
pub fn get_game_session_id() -> Result<String, FleetError> {
    Ok(state()?.game_session_id())
}

/// Seconds since the epoch at which the service will terminate this process.
pub fn get_termination_time() -> Result<i64, FleetError> {
    state()?.termination_time()
}

/// Accepts a player whose session was reserved for this game session.
pub async fn accept_player_session(
    player_session_id: impl Into<String>,
) -> Result<(), FleetError> {
    state()?.accept_player_session(player_session_id).await
}

/// Drops a player session from the current game session.
pub async fn remove_player_session(
    player_session_id: impl Into<String>,
) -> Result<(), FleetError> {
    state()?.remove_player_session(player_session_id).await
}

/// Queries player sessions.
pub async fn describe_player_sessions(
    request: DescribePlayerSessionsRequest,
) -> Result<DescribePlayerSessionsResult, FleetError> {
    state()?.describe_player_sessions(request).await
}

/// Requests more matched players for the ongoing game session.
pub async fn start_match_backfill(
    request: StartMatchBackfillRequest,
) -> Result<StartMatchBackfillResult, FleetError> {
    state()?.start_match_backfill(request).await
}

/// Cancels an in-flight match backfill ticket.
pub async fn stop_match_backfill(request: StopMatchBackfillRequest) -> Result<(), FleetError> {
    state()?.stop_match_backfill(request).await
}

/// Fetches the TLS certificate location for this compute.
pub async fn get_compute_certificate() -> Result<GetComputeCertificateResult, FleetError> {
    state()?.get_compute_certificate().await
}

/// Assumes the fleet role and returns short-lived credentials.
pub async fn get_fleet_role_credentials(
    request: GetFleetRoleCredentialsRequest,
) -> Result<GetFleetRoleCredentialsResult, FleetError> {
    state()?.get_fleet_role_credentials(request).await
}

/// Tears the SDK down: stops heartbeats, disconnects, and clears the
/// shared state so the SDK can be initialized again.
pub async fn destroy() -> Result<(), FleetError> {
    let state = SERVER_STATE
        .write()
        .expect("server state lock poisoned")
        .take()
        .ok_or_else(|| FleetError::new(ErrorKind::NotInitialized))?;
    state.destroy().await
}

// =========================================================================
// Tests
// =========================================================================
