//! The owning server-state machine.
//!
//! One [`ServerState`] per server process. It resolves identity and
//! credentials at init (environment overrides first, container discovery
//! when needed), connects through the manager, and from then on:
//!
//! - drives the heartbeat loop while the process is ready,
//! - dispatches inbound lifecycle notifications to the user's callbacks,
//! - caches short-lived fleet-role credentials,
//! - surfaces the public operations (ready, activate, players, backfill,
//!   certificate, credentials, ending, destroy).
//!
//! ```text
//! init ──→ process_ready ──→ [heartbeat task] ──→ process_ending/destroy
//!              │                                        │
//!              └── CreateGameSession / UpdateGameSession / TerminateProcess
//!                  notifications flow to callbacks while ready
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use fleetlink_auth::{
    generate_sigv4_query_parameters, AwsCredentials, ContainerCredentialsFetcher,
    ContainerMetadataFetcher, SigV4Parameters,
};
use fleetlink_protocol::model::{
    GameSession, PlayerSessionCreationPolicy, UpdateGameSession,
};
use fleetlink_protocol::request::{
    AcceptPlayerSessionRequest, ActivateGameSessionRequest, ActivateServerProcessRequest,
    DescribePlayerSessionsRequest, GetComputeCertificateRequest, GetFleetRoleCredentialsRequest,
    HeartbeatServerProcessRequest, RemovePlayerSessionRequest, StartMatchBackfillRequest,
    StopMatchBackfillRequest, TerminateServerProcessRequest,
    UpdatePlayerSessionCreationPolicyRequest,
};
use fleetlink_protocol::result::{
    DescribePlayerSessionsResult, GetComputeCertificateResult, GetFleetRoleCredentialsResult,
    StartMatchBackfillResult,
};
use fleetlink_protocol::{ErrorKind, FleetError, Message};
use fleetlink_transport::{
    RetryConfig, RetryTransport, Transport, WebsocketDialer, WebsocketTransport,
};

use crate::client::WebsocketClient;
use crate::config::{
    env_seconds_or, env_string_or, env_usize_or, ACTIVATE_SERVER_PROCESS_TIMEOUT,
    BACKFILL_TICKET_ID_MAX_LENGTH, COMPUTE_ID_KEY, COMPUTE_TYPE_CONTAINER, ENV_ACCESS_KEY,
    ENV_AUTH_TOKEN, ENV_AWS_REGION, ENV_COMPUTE_TYPE, ENV_FLEET_ID, ENV_HEALTHCHECK_INTERVAL,
    ENV_HEALTHCHECK_MAX_JITTER, ENV_HEALTHCHECK_TIMEOUT, ENV_HOST_ID, ENV_MAX_RETRY,
    ENV_PROCESS_ID, ENV_RETRY_FACTOR, ENV_RETRY_INTERVAL, ENV_SECRET_KEY,
    ENV_SERVICE_BUFFER_SIZE, ENV_SERVICE_CALL_TIMEOUT, ENV_SESSION_TOKEN, ENV_WEBSOCKET_URL,
    FLEET_ID_KEY, HEALTHCHECK_INTERVAL_DEFAULT, HEALTHCHECK_MAX_JITTER_DEFAULT,
    HEALTHCHECK_RETRY_INTERVAL_DEFAULT, MANAGED_RESOURCE_PROCESS_ID, PID_KEY,
    ROLE_CREDENTIAL_TTL, ROLE_SESSION_NAME_MAX_LENGTH, SDK_LANGUAGE, SDK_VERSION,
    SERVICE_BUFFER_SIZE_DEFAULT, SERVICE_CALL_TIMEOUT_DEFAULT,
};
use crate::manager::{Manager, MessageHandlers};
use crate::params::{ProcessParameters, ServerParameters};

/// The SDK's owning state machine; see the module docs.
pub struct ServerState {
    inner: Arc<StateInner>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState").finish_non_exhaustive()
    }
}

struct StateInner {
    manager: OnceLock<Manager>,

    // Identity: fixed at init (after the container host-id rewrite).
    process_id: String,
    host_id: String,
    fleet_id: String,

    parameters: RwLock<Option<ProcessParameters>>,
    game_session_id: RwLock<String>,
    termination_time: AtomicI64,
    process_ready: AtomicBool,
    on_managed_ec2: AtomicBool,

    role_credentials_cache: Mutex<HashMap<String, GetFleetRoleCredentialsResult>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,

    healthcheck_interval: Duration,
    healthcheck_timeout: Duration,
    healthcheck_max_jitter: Duration,
    service_call_timeout: Duration,
}

impl ServerState {
    /// Initializes the SDK with the production transport stack
    /// (WebSocket dialer wrapped in the write-retry decorator).
    pub async fn init(params: ServerParameters) -> Result<Self, FleetError> {
        let buffer_size = env_usize_or(ENV_SERVICE_BUFFER_SIZE, SERVICE_BUFFER_SIZE_DEFAULT);
        let transport = WebsocketTransport::new(WebsocketDialer::with_buffer_size(buffer_size));

        let retry_defaults = RetryConfig::default();
        let retry_config = RetryConfig {
            max_attempts: env_usize_or(ENV_MAX_RETRY, retry_defaults.max_attempts),
            factor: env_usize_or(ENV_RETRY_FACTOR, retry_defaults.factor as usize) as u32,
            interval: env_seconds_or(ENV_RETRY_INTERVAL, retry_defaults.interval),
        };
        let transport: Arc<dyn Transport> =
            Arc::new(RetryTransport::new(Arc::new(transport), retry_config));

        Self::init_with_transport(params, transport).await
    }

    /// Initializes the SDK over a caller-supplied transport.
    ///
    /// Resolution order for every identity field: environment variable,
    /// then the passed-in parameter. Initialization is rejected unless an
    /// auth token, a region+key+secret triple, or the container compute
    /// type is available.
    pub async fn init_with_transport(
        params: ServerParameters,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, FleetError> {
        let websocket_url = env_string_or(ENV_WEBSOCKET_URL, &params.websocket_url);
        let mut process_id = env_string_or(ENV_PROCESS_ID, &params.process_id);
        let mut host_id = env_string_or(ENV_HOST_ID, &params.host_id);
        let fleet_id = env_string_or(ENV_FLEET_ID, &params.fleet_id);
        let compute_type = env_string_or(ENV_COMPUTE_TYPE, "");
        let auth_token = env_string_or(ENV_AUTH_TOKEN, &params.auth_token);
        let aws_region = env_string_or(ENV_AWS_REGION, &params.aws_region);
        let mut access_key = env_string_or(ENV_ACCESS_KEY, &params.access_key);
        let mut secret_key = env_string_or(ENV_SECRET_KEY, &params.secret_key);
        let mut session_token = env_string_or(ENV_SESSION_TOKEN, &params.session_token);

        // The sentinel never goes on the wire; it means "make one up".
        if env_string_or(ENV_PROCESS_ID, "") == MANAGED_RESOURCE_PROCESS_ID {
            process_id = Uuid::new_v4().to_string();
        }

        let is_container_compute = compute_type == COMPUTE_TYPE_CONTAINER;
        let auth_token_passed = !auth_token.is_empty();
        let sigv4_parameters_passed =
            !aws_region.is_empty() && !access_key.is_empty() && !secret_key.is_empty();
        if !auth_token_passed && !sigv4_parameters_passed && !is_container_compute {
            return Err(FleetError::with_message(
                ErrorKind::BadRequest,
                "either an auth token or a region and credentials are required",
            ));
        }

        let mut sigv4_query_parameters = None;
        if !auth_token_passed {
            if is_container_compute {
                let http = reqwest::Client::new();

                let credentials = ContainerCredentialsFetcher::new(http.clone())
                    .fetch_container_credentials()
                    .await?;
                access_key = credentials.access_key;
                secret_key = credentials.secret_key;
                session_token = credentials.session_token;

                let metadata = ContainerMetadataFetcher::new(http)
                    .fetch_container_task_metadata()
                    .await?;
                host_id = metadata.task_id;
            }

            let query_params = HashMap::from([
                (COMPUTE_ID_KEY.to_string(), host_id.clone()),
                (FLEET_ID_KEY.to_string(), fleet_id.clone()),
                (PID_KEY.to_string(), process_id.clone()),
            ]);
            sigv4_query_parameters = Some(generate_sigv4_query_parameters(&SigV4Parameters {
                region: aws_region,
                credentials: AwsCredentials {
                    access_key,
                    secret_key,
                    session_token,
                },
                query_params,
                request_time: Utc::now(),
            })?);
        }

        let inner = Arc::new(StateInner {
            manager: OnceLock::new(),
            process_id,
            host_id,
            fleet_id,
            parameters: RwLock::new(None),
            game_session_id: RwLock::new(String::new()),
            termination_time: AtomicI64::new(0),
            process_ready: AtomicBool::new(false),
            on_managed_ec2: AtomicBool::new(true),
            role_credentials_cache: Mutex::new(HashMap::new()),
            shutdown: Mutex::new(None),
            healthcheck_interval: env_seconds_or(
                ENV_HEALTHCHECK_INTERVAL,
                HEALTHCHECK_INTERVAL_DEFAULT,
            ),
            healthcheck_timeout: env_seconds_or(
                ENV_HEALTHCHECK_TIMEOUT,
                HEALTHCHECK_INTERVAL_DEFAULT - HEALTHCHECK_RETRY_INTERVAL_DEFAULT,
            ),
            healthcheck_max_jitter: env_seconds_or(
                ENV_HEALTHCHECK_MAX_JITTER,
                HEALTHCHECK_MAX_JITTER_DEFAULT,
            ),
            service_call_timeout: env_seconds_or(
                ENV_SERVICE_CALL_TIMEOUT,
                SERVICE_CALL_TIMEOUT_DEFAULT,
            ),
        });

        let client = WebsocketClient::new(transport);
        let manager = Manager::new(client, Arc::clone(&inner) as Arc<dyn MessageHandlers>);
        let _ = inner.manager.set(manager);

        inner
            .manager()?
            .connect(
                &websocket_url,
                &inner.process_id,
                &inner.host_id,
                &inner.fleet_id,
                &auth_token,
                sigv4_query_parameters.as_ref(),
            )
            .await
            .map_err(|e| {
                FleetError::with_message(ErrorKind::LocalConnectionFailed, e.to_string())
            })?;

        Ok(Self { inner })
    }

    /// Reports this process ready to host game sessions, stores the
    /// callbacks, and starts the heartbeat loop.
    pub async fn process_ready(&self, params: ProcessParameters) -> Result<(), FleetError> {
        let mut request =
            ActivateServerProcessRequest::new(SDK_VERSION, SDK_LANGUAGE, params.port);
        request.log_paths = params.log_parameters.log_paths.clone();
        *self.inner.parameters.write().expect("parameters lock poisoned") = Some(params);

        let result: Result<Message, FleetError> = self
            .inner
            .manager()?
            .handle_request(&request, ACTIVATE_SERVER_PROCESS_TIMEOUT)
            .await;
        if let Err(e) = result {
            return Err(FleetError::with_message(
                ErrorKind::ProcessNotReady,
                e.to_string(),
            ));
        }

        self.inner.process_ready.store(true, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.inner.shutdown.lock().expect("shutdown lock poisoned") = Some(shutdown_tx);
        tokio::spawn(Arc::clone(&self.inner).health_check_loop(shutdown_rx));
        Ok(())
    }

    /// Announces shutdown to the service, then stops the heartbeat loop.
    pub async fn process_ending(&self) -> Result<(), FleetError> {
        if let Err(e) = self
            .inner
            .manager()?
            .send_message(&TerminateServerProcessRequest::new())
            .await
        {
            return Err(FleetError::with_message(
                ErrorKind::ProcessEndingFailed,
                e.to_string(),
            ));
        }
        self.inner.stop_server_process();
        Ok(())
    }

    /// Reports the assigned game session active.
    pub async fn activate_game_session(&self) -> Result<(), FleetError> {
        self.inner.require_ready()?;
        let game_session_id = self.inner.require_game_session()?;
        let request = ActivateGameSessionRequest::new(game_session_id);
        self.inner.manager()?.send_message(&request).await
    }

    /// Changes whether the current game session accepts new players.
    pub async fn update_player_session_creation_policy(
        &self,
        policy: PlayerSessionCreationPolicy,
    ) -> Result<(), FleetError> {
        self.inner.require_ready()?;
        let game_session_id = self.inner.require_game_session()?;
        let request = UpdatePlayerSessionCreationPolicyRequest::new(game_session_id, policy);
        self.inner.manager()?.send_message(&request).await
    }

    /// The id of the assigned game session; empty until one is assigned.
    pub fn game_session_id(&self) -> String {
        self.inner
            .game_session_id
            .read()
            .expect("game session id lock poisoned")
            .clone()
    }

    /// Seconds since the epoch at which the service will terminate this
    /// process, once a terminate-process notification has arrived.
    pub fn termination_time(&self) -> Result<i64, FleetError> {
        let seconds = self.inner.termination_time.load(Ordering::SeqCst);
        if seconds == 0 {
            return Err(FleetError::new(ErrorKind::TerminationTimeNotSet));
        }
        Ok(seconds)
    }

    /// Accepts a player whose session was reserved for this game session.
    pub async fn accept_player_session(
        &self,
        player_session_id: impl Into<String>,
    ) -> Result<(), FleetError> {
        self.inner.require_ready()?;
        let game_session_id = self.inner.require_game_session()?;
        let request = AcceptPlayerSessionRequest::new(game_session_id, player_session_id.into());
        self.inner.manager()?.send_message(&request).await
    }

    /// Drops a player session from the current game session.
    pub async fn remove_player_session(
        &self,
        player_session_id: impl Into<String>,
    ) -> Result<(), FleetError> {
        self.inner.require_ready()?;
        let game_session_id = self.inner.require_game_session()?;
        let request = RemovePlayerSessionRequest::new(game_session_id, player_session_id.into());
        self.inner.manager()?.send_message(&request).await
    }

    /// Queries player sessions.
    pub async fn describe_player_sessions(
        &self,
        request: DescribePlayerSessionsRequest,
    ) -> Result<DescribePlayerSessionsResult, FleetError> {
        self.inner.require_ready()?;
        self.inner
            .manager()?
            .handle_request(&request, self.inner.service_call_timeout)
            .await
    }

    /// Requests more matched players for the ongoing game session.
    pub async fn start_match_backfill(
        &self,
        request: StartMatchBackfillRequest,
    ) -> Result<StartMatchBackfillResult, FleetError> {
        self.inner.require_ready()?;
        if request.ticket_id.len() > BACKFILL_TICKET_ID_MAX_LENGTH {
            return Err(FleetError::with_message(
                ErrorKind::BadRequest,
                format!("ticket id is longer than {BACKFILL_TICKET_ID_MAX_LENGTH} characters"),
            ));
        }
        self.inner
            .manager()?
            .handle_request(&request, self.inner.service_call_timeout)
            .await
    }

    /// Cancels an in-flight match backfill ticket.
    pub async fn stop_match_backfill(
        &self,
        request: StopMatchBackfillRequest,
    ) -> Result<(), FleetError> {
        self.inner.require_ready()?;
        self.inner.manager()?.send_message(&request).await
    }

    /// Fetches the TLS certificate location for this compute.
    pub async fn get_compute_certificate(
        &self,
    ) -> Result<GetComputeCertificateResult, FleetError> {
        tracing::debug!("calling get_compute_certificate");
        self.inner.require_ready()?;
        self.inner
            .manager()?
            .handle_request(
                &GetComputeCertificateRequest::new(),
                self.inner.service_call_timeout,
            )
            .await
    }

    /// Assumes the fleet role and returns short-lived credentials, serving
    /// repeat calls from the cache while at least 15 minutes of lifetime
    /// remain.
    pub async fn get_fleet_role_credentials(
        &self,
        mut request: GetFleetRoleCredentialsRequest,
    ) -> Result<GetFleetRoleCredentialsResult, FleetError> {
        tracing::debug!("calling get_fleet_role_credentials");
        if !self.inner.on_managed_ec2.load(Ordering::SeqCst) {
            return Err(FleetError::with_message(
                ErrorKind::BadRequest,
                "fleet role credentials are only available on managed computes",
            ));
        }

        if let Some(cached) = self.inner.cached_role_credentials(&request.role_arn) {
            return Ok(cached);
        }

        // Role session names are capped by the assume-role API.
        if request.role_session_name.is_empty() {
            let mut name = format!("{}-{}", self.inner.fleet_id, self.inner.host_id);
            name.truncate(ROLE_SESSION_NAME_MAX_LENGTH);
            request.role_session_name = name;
        }
        if request.role_session_name.len() > ROLE_SESSION_NAME_MAX_LENGTH {
            return Err(FleetError::with_message(
                ErrorKind::BadRequest,
                format!(
                    "role session name is longer than {ROLE_SESSION_NAME_MAX_LENGTH} characters"
                ),
            ));
        }

        self.inner.require_ready()?;

        let result: GetFleetRoleCredentialsResult = self
            .inner
            .manager()?
            .handle_request(&request, self.inner.service_call_timeout)
            .await?;

        if result.access_key_id.is_empty() {
            // The fleet has no role to assume; remember that and stop asking.
            self.inner.on_managed_ec2.store(false, Ordering::SeqCst);
            return Err(FleetError::with_message(
                ErrorKind::BadRequest,
                "no credentials are associated with this fleet",
            ));
        }

        self.inner
            .role_credentials_cache
            .lock()
            .expect("role cache lock poisoned")
            .insert(request.role_arn.clone(), result.clone());

        Ok(result)
    }

    /// Stops the heartbeat loop and disconnects.
    pub async fn destroy(&self) -> Result<(), FleetError> {
        self.inner.stop_server_process();
        self.inner.manager()?.disconnect().await
    }
}

impl StateInner {
    fn manager(&self) -> Result<&Manager, FleetError> {
        self.manager
            .get()
            .ok_or_else(|| FleetError::new(ErrorKind::NetworkNotInitialized))
    }

    fn require_ready(&self) -> Result<(), FleetError> {
        if !self.process_ready.load(Ordering::SeqCst) {
            return Err(FleetError::new(ErrorKind::ProcessNotReady));
        }
        Ok(())
    }

    fn require_game_session(&self) -> Result<String, FleetError> {
        let id = self
            .game_session_id
            .read()
            .expect("game session id lock poisoned")
            .clone();
        if id.is_empty() {
            return Err(FleetError::new(ErrorKind::GameSessionIdNotSet));
        }
        Ok(id)
    }

    /// Flips the process out of ready and closes the shutdown channel.
    /// The compare-and-swap makes the close happen exactly once.
    fn stop_server_process(&self) {
        if self
            .process_ready
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Some(sender) = self
                .shutdown
                .lock()
                .expect("shutdown lock poisoned")
                .take()
            {
                drop(sender);
            }
        }
    }

    /// Returns a cached credential only while its remaining lifetime
    /// exceeds the TTL threshold; stale entries are evicted under the
    /// cache lock.
    fn cached_role_credentials(&self, role_arn: &str) -> Option<GetFleetRoleCredentialsResult> {
        let mut cache = self
            .role_credentials_cache
            .lock()
            .expect("role cache lock poisoned");
        if let Some(previous) = cache.get(role_arn) {
            let remaining_millis = previous.expiration - Utc::now().timestamp_millis();
            if remaining_millis > ROLE_CREDENTIAL_TTL.as_millis() as i64 {
                return Some(previous.clone());
            }
            cache.remove(role_arn);
        }
        None
    }

    fn on_health_check(&self) -> Option<crate::params::OnHealthCheck> {
        self.parameters
            .read()
            .expect("parameters lock poisoned")
            .as_ref()
            .and_then(|p| p.on_health_check.clone())
    }

    /// Heartbeat loop: wait one jittered interval (watching shutdown),
    /// then spawn one beat and continue. Exits as soon as the shutdown
    /// channel closes.
    async fn health_check_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("health check task started");
        while self.process_ready.load(Ordering::SeqCst) {
            let interval = jittered_interval(self.healthcheck_interval, self.healthcheck_max_jitter);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => return,
            }
            tokio::spawn(Arc::clone(&self).heartbeat_server_process(shutdown.clone()));
        }
    }

    /// One beat: race the health callback against the health-check
    /// timeout (absent or late callbacks report unhealthy), then send the
    /// heartbeat request. Abandoned entirely if shutdown closes first.
    async fn heartbeat_server_process(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let (status_tx, status_rx) = oneshot::channel();
        match self.on_health_check() {
            Some(callback) => {
                tracing::debug!("reporting health using the health callback");
                tokio::task::spawn_blocking(move || {
                    let _ = status_tx.send(callback());
                });
            }
            None => drop(status_tx),
        }

        let status = tokio::select! {
            _ = tokio::time::sleep(self.healthcheck_timeout) => {
                tracing::debug!("timed out waiting for a health response, reporting unhealthy");
                false
            }
            result = status_rx => {
                let status = result.unwrap_or(false);
                tracing::debug!(status, "received health response");
                status
            }
            _ = shutdown.changed() => return,
        };

        let manager = match self.manager() {
            Ok(manager) => manager,
            Err(_) => return,
        };
        let result: Result<Message, FleetError> = manager
            .handle_request(
                &HeartbeatServerProcessRequest::new(status),
                self.service_call_timeout,
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not send health status");
        }
    }
}

/// The next heartbeat interval: `interval - jitter`, where jitter is
/// drawn zero-mean from `[-max_jitter, +max_jitter]`.
fn jittered_interval(interval: Duration, max_jitter: Duration) -> Duration {
    let max_jitter_ms = max_jitter.as_millis() as i64;
    if max_jitter_ms == 0 {
        return interval;
    }
    let jitter_ms = 2 * rand::rng().random_range(0..max_jitter_ms) - max_jitter_ms;
    if jitter_ms >= 0 {
        interval.saturating_sub(Duration::from_millis(jitter_ms as u64))
    } else {
        interval + Duration::from_millis(jitter_ms.unsigned_abs())
    }
}

#[async_trait]
impl MessageHandlers for StateInner {
    async fn on_start_game_session(&self, mut session: GameSession) {
        // Inject data that only exists on this side of the socket.
        session.fleet_id = self.fleet_id.clone();
        tracing::debug!(
            game_session_id = %session.game_session_id,
            "received the start game session signal"
        );
        if !self.process_ready.load(Ordering::SeqCst) {
            tracing::debug!("got a game session on an inactive process, ignoring");
            return;
        }
        *self
            .game_session_id
            .write()
            .expect("game session id lock poisoned") = session.game_session_id.clone();

        let callback = self
            .parameters
            .read()
            .expect("parameters lock poisoned")
            .as_ref()
            .and_then(|p| p.on_start_game_session.clone());
        if let Some(callback) = callback {
            callback(session);
        }
    }

    async fn on_update_game_session(&self, update: UpdateGameSession) {
        tracing::debug!(
            game_session_id = %update.game_session.game_session_id,
            "received the update game session signal"
        );
        if !self.process_ready.load(Ordering::SeqCst) {
            tracing::warn!("got an updated game session on an inactive process");
            return;
        }
        if update.update_reason.is_none() {
            tracing::warn!("update game session arrived without an update reason");
            return;
        }

        let callback = self
            .parameters
            .read()
            .expect("parameters lock poisoned")
            .as_ref()
            .and_then(|p| p.on_update_game_session.clone());
        if let Some(callback) = callback {
            callback(update);
        }
    }

    async fn on_terminate_process(&self, termination_time_millis: i64) {
        // The notification carries milliseconds; the stored value is seconds.
        self.termination_time
            .store(termination_time_millis / 1000, Ordering::SeqCst);
        tracing::debug!(
            termination_time = termination_time_millis / 1000,
            "received the terminate process signal"
        );

        let callback = self
            .parameters
            .read()
            .expect("parameters lock poisoned")
            .as_ref()
            .and_then(|p| p.on_process_terminate.clone());
        if let Some(callback) = callback {
            callback();
        }
    }

    async fn on_refresh_connection(&self, endpoint: String, auth_token: String) {
        let manager = match self.manager() {
            Ok(manager) => manager,
            Err(e) => {
                tracing::error!(error = %e, "cannot refresh connection before init");
                return;
            }
        };
        if let Err(e) = manager
            .connect(
                &endpoint,
                &self.process_id,
                &self.host_id,
                &self.fleet_id,
                &auth_token,
                None,
            )
            .await
        {
            tracing::error!(
                error = %e,
                "failed to refresh the websocket connection, will retry when the \
                 service resends the notification"
            );
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::{json, Value};

    use fleetlink_transport::ReadHandler;

    // -- Gateway double ---------------------------------------------------

    type Responder = Box<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

    /// A transport double that behaves like the control plane: records
    /// every written frame and answers requests through a responder
    /// (status-200 echo by default).
    struct GatewayTransport {
        handler: Mutex<Option<ReadHandler>>,
        writes: Mutex<Vec<Value>>,
        responder: Mutex<Responder>,
        connect_urls: Mutex<Vec<String>>,
    }

    impl GatewayTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                handler: Mutex::new(None),
                writes: Mutex::new(Vec::new()),
                responder: Mutex::new(Box::new(|_| None)),
                connect_urls: Mutex::new(Vec::new()),
            })
        }

        fn set_responder(
            &self,
            responder: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
        ) {
            *self.responder.lock().unwrap() = Box::new(responder);
        }

        fn frames_with_action(&self, action: &str) -> Vec<Value> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|frame| frame["Action"] == action)
                .cloned()
                .collect()
        }

        async fn inject(&self, frame: Value) {
            let handler = self.handler.lock().unwrap().clone().expect("handler set");
            handler(frame.to_string().into_bytes()).await;
        }
    }

    #[async_trait]
    impl Transport for GatewayTransport {
        async fn connect(&self, url: &str) -> Result<(), FleetError> {
            self.connect_urls.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn write(&self, data: &[u8]) -> Result<(), FleetError> {
            let frame: Value = serde_json::from_slice(data).expect("writes are JSON");
            self.writes.lock().unwrap().push(frame.clone());

            // Answer like the service: echo Action/RequestId with a 200,
            // letting the responder add payload fields.
            let mut response = json!({
                "Action": frame["Action"],
                "RequestId": frame["RequestId"],
                "StatusCode": 200,
                "ErrorMessage": "",
            });
            if let Some(extra) = self.responder.lock().unwrap()(&frame) {
                if let (Some(response_map), Some(extra_map)) =
                    (response.as_object_mut(), extra.as_object())
                {
                    for (key, value) in extra_map {
                        response_map.insert(key.clone(), value.clone());
                    }
                }
            }

            let handler = self.handler.lock().unwrap().clone();
            if let Some(handler) = handler {
                tokio::spawn(handler(response.to_string().into_bytes()));
            }
            Ok(())
        }

        fn set_read_handler(&self, handler: ReadHandler) {
            *self.handler.lock().unwrap() = Some(handler);
        }

        async fn reconnect(&self) -> Result<(), FleetError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), FleetError> {
            Ok(())
        }
    }

    fn token_params() -> ServerParameters {
        ServerParameters {
            websocket_url: "wss://gateway.test".into(),
            process_id: "process-1".into(),
            host_id: "host-1".into(),
            fleet_id: "fleet-1".into(),
            auth_token: "token-1".into(),
            ..Default::default()
        }
    }

    async fn ready_state(gateway: &Arc<GatewayTransport>) -> ServerState {
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init should succeed");
        state
            .process_ready(ProcessParameters::default())
            .await
            .expect("process_ready should succeed");
        state
    }

    async fn assign_game_session(gateway: &Arc<GatewayTransport>, id: &str) {
        gateway
            .inject(json!({
                "Action": "CreateGameSession",
                "RequestId": "notify-1",
                "StatusCode": 200,
                "GameSessionId": id,
            }))
            .await;
    }

    // -- init -------------------------------------------------------------

    #[tokio::test]
    async fn test_init_without_credentials_is_bad_request() {
        let gateway = GatewayTransport::new();
        let params = ServerParameters {
            websocket_url: "wss://gateway.test".into(),
            process_id: "p".into(),
            host_id: "h".into(),
            fleet_id: "f".into(),
            ..Default::default()
        };
        let err = ServerState::init_with_transport(params, gateway as Arc<dyn Transport>)
            .await
            .expect_err("should be rejected");
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_init_with_token_connects_with_identity_query() {
        let gateway = GatewayTransport::new();
        ServerState::init_with_transport(token_params(), gateway.clone() as Arc<dyn Transport>)
            .await
            .expect("init should succeed");

        let url = gateway.connect_urls.lock().unwrap()[0].clone();
        assert!(url.starts_with("wss://gateway.test"));
        assert!(url.contains("pID=process-1"));
        assert!(url.contains("ComputeId=host-1"));
        assert!(url.contains("FleetId=fleet-1"));
        assert!(url.contains("Authorization=token-1"));
        assert!(url.contains(&format!("sdkVersion={SDK_VERSION}")));
        assert!(url.contains(&format!("sdkLanguage={SDK_LANGUAGE}")));
    }

    #[tokio::test]
    async fn test_init_with_credentials_connects_with_signed_query() {
        let gateway = GatewayTransport::new();
        let params = ServerParameters {
            websocket_url: "wss://gateway.test".into(),
            process_id: "p".into(),
            host_id: "h".into(),
            fleet_id: "f".into(),
            aws_region: "us-east-1".into(),
            access_key: "AKIA".into(),
            secret_key: "secret".into(),
            ..Default::default()
        };
        ServerState::init_with_transport(params, gateway.clone() as Arc<dyn Transport>)
            .await
            .expect("init should succeed");

        let url = gateway.connect_urls.lock().unwrap()[0].clone();
        assert!(url.contains("Authorization=SigV4"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Credential=AKIA%2F"));
    }

    // -- process_ready / heartbeat ---------------------------------------

    #[tokio::test]
    async fn test_process_ready_sends_activate_with_port_and_log_paths() {
        let gateway = GatewayTransport::new();
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        state
            .process_ready(ProcessParameters {
                port: 8080,
                log_parameters: crate::params::LogParameters {
                    log_paths: vec!["/game/logs".into()],
                },
                ..Default::default()
            })
            .await
            .expect("process_ready should succeed");

        let frames = gateway.frames_with_action("ActivateServerProcess");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["Port"], 8080);
        assert_eq!(frames[0]["SdkVersion"], SDK_VERSION);
        assert_eq!(frames[0]["SdkLanguage"], SDK_LANGUAGE);
        assert_eq!(frames[0]["LogPaths"], json!(["/game/logs"]));
    }

    #[tokio::test]
    async fn test_process_ready_failure_maps_to_process_not_ready() {
        let gateway = GatewayTransport::new();
        gateway.set_responder(|frame| {
            if frame["Action"] == "ActivateServerProcess" {
                Some(json!({"StatusCode": 500, "ErrorMessage": "no capacity"}))
            } else {
                None
            }
        });
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        let err = state
            .process_ready(ProcessParameters::default())
            .await
            .expect_err("should fail");
        assert_eq!(err.kind, ErrorKind::ProcessNotReady);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_fires_within_one_interval() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        // One interval plus the maximum jitter covers the first beat.
        tokio::time::sleep(Duration::from_secs(71)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let beats = gateway.frames_with_action("HeartbeatServerProcess");
        assert!(!beats.is_empty(), "expected a heartbeat within one interval");
        // No health callback was provided, so the beat reports unhealthy.
        assert_eq!(beats[0]["HealthStatus"], false);

        state.destroy().await.expect("destroy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_reports_healthy_callback_result() {
        let gateway = GatewayTransport::new();
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        state
            .process_ready(ProcessParameters {
                on_health_check: Some(Arc::new(|| true)),
                ..Default::default()
            })
            .await
            .expect("process_ready");

        tokio::time::sleep(Duration::from_secs(71)).await;
        // The callback runs on a blocking thread, which needs real time,
        // not just virtual time.
        for _ in 0..200 {
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            if !gateway.frames_with_action("HeartbeatServerProcess").is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        let beats = gateway.frames_with_action("HeartbeatServerProcess");
        assert!(!beats.is_empty());
        assert_eq!(beats[0]["HealthStatus"], true);

        state.destroy().await.expect("destroy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_ending_sends_terminate_and_stops_heartbeats() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        state.process_ending().await.expect("process_ending");
        assert_eq!(gateway.frames_with_action("TerminateServerProcess").len(), 1);

        // With the loop stopped, no beats appear over several intervals.
        tokio::time::sleep(Duration::from_secs(300)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(gateway.frames_with_action("HeartbeatServerProcess").is_empty());
    }

    #[tokio::test]
    async fn test_stop_server_process_closes_shutdown_exactly_once() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        assert!(state.inner.process_ready.load(Ordering::SeqCst));
        state.inner.stop_server_process();
        assert!(!state.inner.process_ready.load(Ordering::SeqCst));
        assert!(state.inner.shutdown.lock().unwrap().is_none());

        // A second stop is a no-op, not a double close.
        state.inner.stop_server_process();
    }

    #[test]
    fn test_jittered_interval_stays_within_bounds() {
        let interval = Duration::from_secs(60);
        let max_jitter = Duration::from_secs(10);
        for _ in 0..1000 {
            let next = jittered_interval(interval, max_jitter);
            assert!(next >= Duration::from_secs(50), "below bound: {next:?}");
            assert!(next <= Duration::from_secs(70), "above bound: {next:?}");
        }
    }

    #[test]
    fn test_jittered_interval_zero_jitter_is_exact() {
        assert_eq!(
            jittered_interval(Duration::from_secs(60), Duration::ZERO),
            Duration::from_secs(60)
        );
    }

    // -- guarded operations ----------------------------------------------

    #[tokio::test]
    async fn test_operations_before_ready_are_process_not_ready() {
        let gateway = GatewayTransport::new();
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        let err = state.activate_game_session().await.expect_err("not ready");
        assert_eq!(err.kind, ErrorKind::ProcessNotReady);

        let err = state
            .describe_player_sessions(DescribePlayerSessionsRequest::new())
            .await
            .expect_err("not ready");
        assert_eq!(err.kind, ErrorKind::ProcessNotReady);
    }

    #[tokio::test]
    async fn test_session_operations_without_session_are_rejected() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        let err = state
            .accept_player_session("psess-1")
            .await
            .expect_err("no session");
        assert_eq!(err.kind, ErrorKind::GameSessionIdNotSet);

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_accept_player_session_carries_assigned_session_id() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        assign_game_session(&gateway, "gs-42").await;
        assert_eq!(state.game_session_id(), "gs-42");

        state
            .accept_player_session("psess-1")
            .await
            .expect("accept should succeed");

        let frames = gateway.frames_with_action("AcceptPlayerSession");
        assert_eq!(frames[0]["GameSessionId"], "gs-42");
        assert_eq!(frames[0]["PlayerSessionId"], "psess-1");

        state.destroy().await.expect("destroy");
    }

    // -- notifications ----------------------------------------------------

    #[tokio::test]
    async fn test_start_game_session_stamps_fleet_id_and_calls_back() {
        let gateway = GatewayTransport::new();
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        let seen: Arc<Mutex<Vec<GameSession>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        state
            .process_ready(ProcessParameters {
                on_start_game_session: Some(Arc::new(move |session| {
                    sink.lock().unwrap().push(session);
                })),
                ..Default::default()
            })
            .await
            .expect("process_ready");

        assign_game_session(&gateway, "gs-7").await;

        let sessions = seen.lock().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].game_session_id, "gs-7");
        assert_eq!(sessions[0].fleet_id, "fleet-1");

        drop(sessions);
        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_start_game_session_on_inactive_process_is_dropped() {
        let gateway = GatewayTransport::new();
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        assign_game_session(&gateway, "gs-early").await;
        assert_eq!(state.game_session_id(), "");
    }

    #[tokio::test]
    async fn test_update_without_reason_skips_callback() {
        let gateway = GatewayTransport::new();
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        state
            .process_ready(ProcessParameters {
                on_update_game_session: Some(Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                ..Default::default()
            })
            .await
            .expect("process_ready");

        gateway
            .inject(json!({
                "Action": "UpdateGameSession",
                "RequestId": "notify-2",
                "StatusCode": 200,
                "GameSession": {"GameSessionId": "gs-1"},
            }))
            .await;
        assert_eq!(updates.load(Ordering::SeqCst), 0);

        gateway
            .inject(json!({
                "Action": "UpdateGameSession",
                "RequestId": "notify-3",
                "StatusCode": 200,
                "GameSession": {"GameSessionId": "gs-1"},
                "UpdateReason": "BACKFILL_FAILED",
            }))
            .await;
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_terminate_process_stores_seconds_and_calls_back() {
        let gateway = GatewayTransport::new();
        let state = ServerState::init_with_transport(
            token_params(),
            gateway.clone() as Arc<dyn Transport>,
        )
        .await
        .expect("init");

        let err = state.termination_time().expect_err("unset at first");
        assert_eq!(err.kind, ErrorKind::TerminationTimeNotSet);

        let terminated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&terminated);
        state
            .process_ready(ProcessParameters {
                on_process_terminate: Some(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                ..Default::default()
            })
            .await
            .expect("process_ready");

        gateway
            .inject(json!({
                "Action": "TerminateProcess",
                "RequestId": "notify-4",
                "StatusCode": 200,
                "TerminationTime": 1_720_000_000_000i64,
            }))
            .await;

        assert_eq!(state.termination_time().expect("set"), 1_720_000_000);
        assert_eq!(terminated.load(Ordering::SeqCst), 1);

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_refresh_connection_reconnects_with_new_endpoint() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        gateway
            .inject(json!({
                "Action": "RefreshConnection",
                "RequestId": "notify-5",
                "StatusCode": 200,
                "RefreshConnectionEndpoint": "wss://fresh.test",
                "AuthToken": "token-2",
            }))
            .await;

        let urls = gateway.connect_urls.lock().unwrap().clone();
        assert_eq!(urls.len(), 2);
        assert!(urls[1].starts_with("wss://fresh.test"));
        assert!(urls[1].contains("Authorization=token-2"));

        drop(urls);
        state.destroy().await.expect("destroy");
    }

    // -- fleet role credentials -------------------------------------------

    fn credential_responder(expiration_millis: i64) -> impl Fn(&Value) -> Option<Value> {
        move |frame: &Value| {
            if frame["Action"] == "GetFleetRoleCredentials" {
                Some(json!({
                    "AccessKeyId": "AKIA",
                    "SecretAccessKey": "secret",
                    "SessionToken": "session",
                    "Expiration": expiration_millis,
                }))
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn test_fleet_role_credentials_cached_while_fresh() {
        let gateway = GatewayTransport::new();
        // Expires far beyond the 15-minute threshold.
        gateway.set_responder(credential_responder(
            Utc::now().timestamp_millis() + 60 * 60 * 1000,
        ));
        let state = ready_state(&gateway).await;

        let first = state
            .get_fleet_role_credentials(GetFleetRoleCredentialsRequest::new("arn:role"))
            .await
            .expect("first fetch");
        let second = state
            .get_fleet_role_credentials(GetFleetRoleCredentialsRequest::new("arn:role"))
            .await
            .expect("cached fetch");

        assert_eq!(first, second);
        assert_eq!(
            gateway.frames_with_action("GetFleetRoleCredentials").len(),
            1,
            "second call must be served from the cache"
        );

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_fleet_role_credentials_near_expiry_refetches() {
        let gateway = GatewayTransport::new();
        // Only 10 minutes of lifetime left: under the 15-minute threshold.
        gateway.set_responder(credential_responder(
            Utc::now().timestamp_millis() + 10 * 60 * 1000,
        ));
        let state = ready_state(&gateway).await;

        for _ in 0..2 {
            state
                .get_fleet_role_credentials(GetFleetRoleCredentialsRequest::new("arn:role"))
                .await
                .expect("fetch");
        }

        assert_eq!(
            gateway.frames_with_action("GetFleetRoleCredentials").len(),
            2,
            "stale entries must be evicted and refetched"
        );

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_fleet_role_credentials_defaults_session_name() {
        let gateway = GatewayTransport::new();
        gateway.set_responder(credential_responder(
            Utc::now().timestamp_millis() + 60 * 60 * 1000,
        ));
        let state = ready_state(&gateway).await;

        state
            .get_fleet_role_credentials(GetFleetRoleCredentialsRequest::new("arn:role"))
            .await
            .expect("fetch");

        let frames = gateway.frames_with_action("GetFleetRoleCredentials");
        assert_eq!(frames[0]["RoleSessionName"], "fleet-1-host-1");

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_fleet_role_credentials_rejects_long_session_name() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        let mut request = GetFleetRoleCredentialsRequest::new("arn:role");
        request.role_session_name = "x".repeat(ROLE_SESSION_NAME_MAX_LENGTH + 1);
        let err = state
            .get_fleet_role_credentials(request)
            .await
            .expect_err("should reject");
        assert_eq!(err.kind, ErrorKind::BadRequest);

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_fleet_role_credentials_empty_access_key_disables_managed() {
        let gateway = GatewayTransport::new();
        // Default responder: echoes with no credential fields at all.
        let state = ready_state(&gateway).await;

        let err = state
            .get_fleet_role_credentials(GetFleetRoleCredentialsRequest::new("arn:role"))
            .await
            .expect_err("no credentials on this fleet");
        assert_eq!(err.kind, ErrorKind::BadRequest);

        // Subsequent calls fail fast without touching the wire.
        let before = gateway.frames_with_action("GetFleetRoleCredentials").len();
        let err = state
            .get_fleet_role_credentials(GetFleetRoleCredentialsRequest::new("arn:role"))
            .await
            .expect_err("still rejected");
        assert_eq!(err.kind, ErrorKind::BadRequest);
        assert_eq!(
            gateway.frames_with_action("GetFleetRoleCredentials").len(),
            before
        );

        state.destroy().await.expect("destroy");
    }

    // -- backfill ----------------------------------------------------------

    #[tokio::test]
    async fn test_start_match_backfill_rejects_oversized_ticket() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        let mut request = StartMatchBackfillRequest::new("arn:gs", "arn:cfg", vec![]);
        request.ticket_id = "t".repeat(BACKFILL_TICKET_ID_MAX_LENGTH + 1);
        let err = state
            .start_match_backfill(request)
            .await
            .expect_err("should reject");
        assert_eq!(err.kind, ErrorKind::BadRequest);

        state.destroy().await.expect("destroy");
    }

    #[tokio::test]
    async fn test_stop_match_backfill_is_fire_and_forget() {
        let gateway = GatewayTransport::new();
        let state = ready_state(&gateway).await;

        state
            .stop_match_backfill(StopMatchBackfillRequest::new())
            .await
            .expect("should send");
        assert_eq!(gateway.frames_with_action("StopMatchBackfill").len(), 1);

        state.destroy().await.expect("destroy");
    }
}
