//! Parameter records the game server hands to the SDK.

use std::fmt;
use std::sync::Arc;

use fleetlink_protocol::model::{GameSession, UpdateGameSession};

/// Callback invoked when the service assigns a game session to this process.
pub type OnStartGameSession = Arc<dyn Fn(GameSession) + Send + Sync>;

/// Callback invoked when the assigned game session is updated.
pub type OnUpdateGameSession = Arc<dyn Fn(UpdateGameSession) + Send + Sync>;

/// Callback invoked when the service orders this process to terminate.
pub type OnProcessTerminate = Arc<dyn Fn() + Send + Sync>;

/// Callback polled on each heartbeat; return `false` to report unhealthy.
pub type OnHealthCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Identity and credentials for [`ServerState::init`](crate::ServerState::init).
///
/// Every field can be overridden by its environment variable; see the
/// `ENV_*` constants in [`config`](crate::config).
#[derive(Debug, Clone, Default)]
pub struct ServerParameters {
    /// The service gateway endpoint to connect to.
    pub websocket_url: String,

    /// Unique id of this server process.
    pub process_id: String,

    /// Id of the compute hosting this process. Rewritten to the task id on
    /// container computes.
    pub host_id: String,

    /// Id of the fleet this compute belongs to.
    pub fleet_id: String,

    /// Opaque auth token. When set, handshake signing is skipped.
    pub auth_token: String,

    /// Region used for handshake signing when no auth token is present.
    pub aws_region: String,

    /// Access key used for handshake signing.
    pub access_key: String,

    /// Secret key used for handshake signing.
    pub secret_key: String,

    /// Optional session token attached to the signed handshake.
    pub session_token: String,
}

/// Locations of log files the service should capture for this process.
#[derive(Debug, Clone, Default)]
pub struct LogParameters {
    pub log_paths: Vec<String>,
}

/// Port, log paths, and callbacks supplied with
/// [`process_ready`](crate::ServerState::process_ready).
#[derive(Clone, Default)]
pub struct ProcessParameters {
    /// Port this process listens on for player connections.
    pub port: u16,

    pub log_parameters: LogParameters,

    pub on_start_game_session: Option<OnStartGameSession>,
    pub on_update_game_session: Option<OnUpdateGameSession>,
    pub on_process_terminate: Option<OnProcessTerminate>,
    pub on_health_check: Option<OnHealthCheck>,
}

impl fmt::Debug for ProcessParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessParameters")
            .field("port", &self.port)
            .field("log_parameters", &self.log_parameters)
            .field("on_start_game_session", &self.on_start_game_session.is_some())
            .field("on_update_game_session", &self.on_update_game_session.is_some())
            .field("on_process_terminate", &self.on_process_terminate.is_some())
            .field("on_health_check", &self.on_health_check.is_some())
            .finish()
    }
}
