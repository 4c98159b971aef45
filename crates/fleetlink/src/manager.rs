//! Orchestration around the mux client.
//!
//! The manager builds the connect URL (query parameters in a fixed order),
//! installs the four asynchronous lifecycle handlers, and exposes the
//! synchronous request path: send, wait with a timeout, decode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use url::Url;

use fleetlink_protocol::model::{GameSession, UpdateGameSession};
use fleetlink_protocol::notify::{
    CreateGameSessionMessage, RefreshConnectionMessage, TerminateProcessMessage,
    UpdateGameSessionMessage,
};
use fleetlink_protocol::{Action, ErrorKind, FleetError, Request};

use crate::client::{ActionHandler, WebsocketClient};
use crate::config::{
    AUTH_TOKEN_KEY, COMPUTE_ID_KEY, FLEET_ID_KEY, PID_KEY, SDK_LANGUAGE, SDK_LANGUAGE_KEY,
    SDK_VERSION, SDK_VERSION_KEY,
};

/// The lifecycle notifications the manager forwards out of the socket.
///
/// Implemented by the server state; the manager decodes each notification
/// payload and calls the matching method.
#[async_trait]
pub trait MessageHandlers: Send + Sync {
    async fn on_start_game_session(&self, session: GameSession);
    async fn on_update_game_session(&self, update: UpdateGameSession);
    async fn on_terminate_process(&self, termination_time_millis: i64);
    async fn on_refresh_connection(&self, endpoint: String, auth_token: String);
}

/// Thin orchestration layer over one [`WebsocketClient`].
pub struct Manager {
    client: Arc<WebsocketClient>,
    handlers: Arc<dyn MessageHandlers>,
}

impl Manager {
    pub fn new(client: Arc<WebsocketClient>, handlers: Arc<dyn MessageHandlers>) -> Self {
        Self { client, handlers }
    }

    /// Builds the connect URL and connects.
    ///
    /// Query keys are attached in a fixed order: process id, SDK version,
    /// SDK language, compute id, fleet id, then either the auth token or
    /// every entry of the signed-parameter map. A non-empty token wins and
    /// the signed map is ignored. On success the four lifecycle handlers
    /// are (re-)registered.
    pub async fn connect(
        &self,
        websocket_url: &str,
        process_id: &str,
        host_id: &str,
        fleet_id: &str,
        auth_token: &str,
        sigv4_query_parameters: Option<&HashMap<String, String>>,
    ) -> Result<(), FleetError> {
        tracing::debug!(
            websocket_url,
            process_id,
            host_id,
            fleet_id,
            "connecting to the service websocket"
        );

        let mut url = Url::parse(websocket_url).map_err(|e| {
            FleetError::with_message(ErrorKind::BadRequest, format!("invalid websocket url: {e}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair(PID_KEY, process_id);
            query.append_pair(SDK_VERSION_KEY, SDK_VERSION);
            query.append_pair(SDK_LANGUAGE_KEY, SDK_LANGUAGE);
            query.append_pair(COMPUTE_ID_KEY, host_id);
            query.append_pair(FLEET_ID_KEY, fleet_id);
            if !auth_token.is_empty() {
                query.append_pair(AUTH_TOKEN_KEY, auth_token);
            } else if let Some(params) = sigv4_query_parameters {
                for (key, value) in params {
                    query.append_pair(key, value);
                }
            }
        }

        self.client.connect(url.as_str()).await?;

        self.client
            .add_handler(Action::CreateGameSession, self.on_start_game_session());
        self.client
            .add_handler(Action::UpdateGameSession, self.on_update_game_session());
        self.client
            .add_handler(Action::RefreshConnection, self.on_refresh_connection());
        self.client
            .add_handler(Action::TerminateProcess, self.on_terminate_process());

        Ok(())
    }

    /// Closes the client and its transport.
    pub async fn disconnect(&self) -> Result<(), FleetError> {
        self.client.close().await
    }

    /// Fire-and-forget send.
    pub async fn send_message<T: Serialize>(&self, msg: &T) -> Result<(), FleetError> {
        self.client.send_message(msg).await
    }

    /// Sends a request, waits up to `timeout` for its response, and decodes
    /// the payload.
    ///
    /// On timeout the pending entry is cancelled and the call fails with
    /// [`ErrorKind::ServiceCallFailed`]; a decode failure of the payload is
    /// an [`ErrorKind::InternalService`].
    pub async fn handle_request<R, T>(&self, req: &R, timeout: Duration) -> Result<T, FleetError>
    where
        R: Request,
        T: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        self.client.send_request(req, tx).await?;

        match tokio::time::timeout(timeout, rx).await {
            Err(_elapsed) => {
                self.client.cancel_request(req.request_id());
                tracing::error!(
                    request_id = %req.request_id(),
                    "response not received within time limit"
                );
                Err(FleetError::new(ErrorKind::ServiceCallFailed))
            }
            Ok(Err(_closed)) => {
                // Channel closed without a value: the request was cancelled
                // or the client shut down.
                Err(FleetError::with_message(
                    ErrorKind::InternalService,
                    "response channel closed before a response arrived",
                ))
            }
            Ok(Ok(outcome)) => {
                let data = outcome?;
                serde_json::from_slice(&data).map_err(|e| {
                    tracing::error!(error = %e, "failed to parse response data");
                    FleetError::new(ErrorKind::InternalService)
                })
            }
        }
    }

    fn on_start_game_session(&self) -> ActionHandler {
        let handlers = Arc::clone(&self.handlers);
        Arc::new(move |data| {
            let handlers = Arc::clone(&handlers);
            Box::pin(async move {
                match serde_json::from_slice::<CreateGameSessionMessage>(&data) {
                    Ok(msg) => handlers.on_start_game_session(msg.into()).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse create game session message");
                    }
                }
            }) as BoxFuture<'static, ()>
        })
    }

    fn on_update_game_session(&self) -> ActionHandler {
        let handlers = Arc::clone(&self.handlers);
        Arc::new(move |data| {
            let handlers = Arc::clone(&handlers);
            Box::pin(async move {
                match serde_json::from_slice::<UpdateGameSessionMessage>(&data) {
                    Ok(msg) => handlers.on_update_game_session(msg.update).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse update game session message");
                    }
                }
            }) as BoxFuture<'static, ()>
        })
    }

    fn on_terminate_process(&self) -> ActionHandler {
        let handlers = Arc::clone(&self.handlers);
        Arc::new(move |data| {
            let handlers = Arc::clone(&handlers);
            Box::pin(async move {
                match serde_json::from_slice::<TerminateProcessMessage>(&data) {
                    Ok(msg) => handlers.on_terminate_process(msg.termination_time).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse terminate process message");
                    }
                }
            }) as BoxFuture<'static, ()>
        })
    }

    fn on_refresh_connection(&self) -> ActionHandler {
        let handlers = Arc::clone(&self.handlers);
        Arc::new(move |data| {
            let handlers = Arc::clone(&handlers);
            Box::pin(async move {
                match serde_json::from_slice::<RefreshConnectionMessage>(&data) {
                    Ok(msg) => {
                        handlers
                            .on_refresh_connection(
                                msg.refresh_connection_endpoint,
                                msg.auth_token,
                            )
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse refresh connection message");
                    }
                }
            }) as BoxFuture<'static, ()>
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
