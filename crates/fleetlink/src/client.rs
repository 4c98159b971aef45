//! The multiplexing WebSocket client.
//!
//! Sits directly on the transport and owns two tables:
//!
//! - **pending requests** — `RequestId → oneshot::Sender<Outcome>`. An
//!   entry is inserted before its frame goes on the wire, so a response
//!   can never race ahead of its waiter, and removed exactly once by the
//!   first of response arrival, timeout cancellation, or client close.
//! - **async handlers** — `Action → handler`, installed once at connect
//!   time for the asynchronous lifecycle notifications.
//!
//! The two tables sit behind distinct locks: handlers are written once and
//! read per frame, while pending entries churn on every request.
//!
//! Inbound routing (see [`WebsocketClient::handle_frame`]) is a three-way
//! variant: pending waiter by request id, async handler by action, or drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::oneshot;

use fleetlink_protocol::{
    ErrorKind, FleetError, Outcome, Request, ResponseMessage, Action, STATUS_OK,
};
use fleetlink_transport::{ReadHandler, Transport};

/// Handler for one asynchronous notification action. Receives the raw
/// frame bytes; decoding is the handler's business.
pub type ActionHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Multiplexes one transport between request/response waiters and
/// asynchronous notification handlers.
pub struct WebsocketClient {
    transport: Arc<dyn Transport>,
    pending: Mutex<HashMap<String, oneshot::Sender<Outcome>>>,
    handlers: RwLock<HashMap<Action, ActionHandler>>,
}

impl WebsocketClient {
    /// Creates the client and registers it as the transport's read handler.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let client = Arc::new(Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
        });

        let weak = Arc::downgrade(&client);
        let handler: ReadHandler = Arc::new(move |data: Vec<u8>| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(client) = weak.upgrade() {
                    client.handle_frame(data).await;
                }
            }) as BoxFuture<'static, ()>
        });
        client.transport.set_read_handler(handler);

        client
    }

    /// Connects the underlying transport. All sends before this fail.
    pub async fn connect(&self, url: &str) -> Result<(), FleetError> {
        self.transport.connect(url).await?;
        tracing::debug!("connected to the service gateway");
        Ok(())
    }

    /// Serializes `msg` and writes it, without waiting for any response.
    pub async fn send_message<T: Serialize>(&self, msg: &T) -> Result<(), FleetError> {
        let data = serde_json::to_vec(msg).map_err(|e| {
            FleetError::with_name_message(
                ErrorKind::ServiceCallFailed,
                "Failed serialize data",
                e.to_string(),
            )
        })?;
        self.transport.write(&data).await.map_err(|e| {
            FleetError::with_name_message(
                ErrorKind::ServiceCallFailed,
                "Failed write data",
                e.to_string(),
            )
        })
    }

    /// Sends a request whose response will resolve `resp`.
    ///
    /// The pending entry is inserted before the frame is written; on a
    /// write failure the entry is resolved with that error, removed, and
    /// the error returned.
    pub async fn send_request<R: Request>(
        &self,
        req: &R,
        resp: oneshot::Sender<Outcome>,
    ) -> Result<(), FleetError> {
        if req.request_id().is_empty() {
            return Err(FleetError::with_message(ErrorKind::BadRequest, "empty RequestId"));
        }

        self.store_pending(req.request_id(), resp)?;
        if let Err(e) = self.send_message(req).await {
            self.resolve(req.request_id(), None, Some(e.clone()));
            return Err(e);
        }
        Ok(())
    }

    /// Registers the handler for one asynchronous notification action.
    pub fn add_handler(&self, action: Action, handler: ActionHandler) {
        self.handlers
            .write()
            .expect("handler lock poisoned")
            .insert(action, handler);
    }

    /// Cancels a pending request: the waiter observes its channel closing
    /// without a value, and a late response is dropped at debug level.
    pub fn cancel_request(&self, request_id: &str) {
        self.resolve(request_id, None, None);
    }

    /// Closes every pending-request channel, then the transport. All
    /// further sends fail.
    pub async fn close(&self) -> Result<(), FleetError> {
        self.pending.lock().expect("pending lock poisoned").clear();
        self.transport.close().await
    }

    fn store_pending(
        &self,
        request_id: &str,
        resp: oneshot::Sender<Outcome>,
    ) -> Result<(), FleetError> {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        if pending.contains_key(request_id) {
            tracing::error!(request_id, "request already exists");
            return Err(FleetError::new(ErrorKind::InternalService));
        }
        pending.insert(request_id.to_string(), resp);
        Ok(())
    }

    /// Resolves and removes a pending entry. With data, the waiter receives
    /// `{payload, error}`; without, the channel just closes (cancellation
    /// and send-failure paths).
    fn resolve(&self, request_id: &str, data: Option<Vec<u8>>, error: Option<FleetError>) {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        let Some(sender) = pending.remove(request_id) else {
            tracing::debug!(request_id, "response received for unknown request id");
            return;
        };
        if let Some(data) = data {
            let outcome = match error {
                Some(e) => Err(e),
                None => Ok(data),
            };
            let _ = sender.send(outcome);
        }
        // Dropping the sender closes the channel.
    }

    /// Routes one inbound frame.
    async fn handle_frame(&self, data: Vec<u8>) {
        let envelope: ResponseMessage = match serde_json::from_slice(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "failed to deserialize response envelope");
                return;
            }
        };

        tracing::debug!(
            action = %envelope.message.action,
            status = envelope.status_code,
            "received frame"
        );

        if envelope.status_code != STATUS_OK {
            if envelope.message.request_id.is_empty() {
                // No waiter to notify and no handler is invoked for
                // failure frames.
                tracing::warn!(
                    action = %envelope.message.action,
                    status = envelope.status_code,
                    "dropping failure frame without a request id"
                );
                return;
            }
            tracing::warn!(
                status = envelope.status_code,
                request_id = %envelope.message.request_id,
                error_message = %envelope.error_message,
                "received unsuccessful status code"
            );
            let err = FleetError::from_status_code(envelope.status_code, envelope.error_message);
            self.resolve(&envelope.message.request_id, Some(data), Some(err));
            return;
        }

        let handler = self
            .handlers
            .read()
            .expect("handler lock poisoned")
            .get(&envelope.message.action)
            .cloned();
        if let Some(handler) = handler {
            handler(data).await;
            return;
        }

        self.resolve(&envelope.message.request_id, Some(data), None);
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use fleetlink_protocol::request::DescribePlayerSessionsRequest;

    /// A transport that records writes and lets tests inject frames.
    struct LoopTransport {
        writes: Mutex<Vec<Vec<u8>>>,
        write_failures: AtomicUsize,
        connected: std::sync::atomic::AtomicBool,
        handler: Mutex<Option<ReadHandler>>,
    }

    impl LoopTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                writes: Mutex::new(Vec::new()),
                write_failures: AtomicUsize::new(0),
                connected: std::sync::atomic::AtomicBool::new(true),
                handler: Mutex::new(None),
            })
        }

        async fn inject(&self, frame: &str) {
            let handler = self.handler.lock().unwrap().clone().expect("handler set");
            handler(frame.as_bytes().to_vec()).await;
        }
    }

    #[async_trait]
    impl Transport for LoopTransport {
        async fn connect(&self, _url: &str) -> Result<(), FleetError> {
            Ok(())
        }

        async fn write(&self, data: &[u8]) -> Result<(), FleetError> {
            if self.write_failures.load(Ordering::SeqCst) > 0 {
                self.write_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(FleetError::new(ErrorKind::WebsocketSendMessageFailure));
            }
            if !self.connected.load(Ordering::SeqCst) {
                return Err(FleetError::new(ErrorKind::NotInitialized));
            }
            self.writes.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        fn set_read_handler(&self, handler: ReadHandler) {
            *self.handler.lock().unwrap() = Some(handler);
        }

        async fn reconnect(&self) -> Result<(), FleetError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), FleetError> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn response_frame(request_id: &str, status: u16) -> String {
        format!(
            r#"{{"Action":"DescribePlayerSessions","RequestId":"{request_id}","StatusCode":{status},"ErrorMessage":"","NextToken":"n"}}"#
        )
    }

    #[tokio::test]
    async fn test_send_request_resolves_waiter_on_response() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let req = DescribePlayerSessionsRequest::new();
        let id = req.request_id().to_string();
        let (tx, rx) = oneshot::channel();
        client.send_request(&req, tx).await.expect("send should succeed");

        transport.inject(&response_frame(&id, 200)).await;

        let outcome = rx.await.expect("waiter should resolve");
        let data = outcome.expect("should be a success outcome");
        assert!(String::from_utf8_lossy(&data).contains("\"NextToken\":\"n\""));
    }

    #[tokio::test]
    async fn test_send_request_non_200_resolves_with_mapped_error() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let req = DescribePlayerSessionsRequest::new();
        let id = req.request_id().to_string();
        let (tx, rx) = oneshot::channel();
        client.send_request(&req, tx).await.expect("send should succeed");

        transport.inject(&response_frame(&id, 404)).await;

        let err = rx.await.expect("waiter should resolve").expect_err("error");
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_send_request_5xx_maps_to_internal_service() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let req = DescribePlayerSessionsRequest::new();
        let id = req.request_id().to_string();
        let (tx, rx) = oneshot::channel();
        client.send_request(&req, tx).await.expect("send should succeed");

        transport.inject(&response_frame(&id, 500)).await;

        let err = rx.await.expect("waiter should resolve").expect_err("error");
        assert_eq!(err.kind, ErrorKind::InternalService);
    }

    #[tokio::test]
    async fn test_send_request_duplicate_id_is_internal_service() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let req = DescribePlayerSessionsRequest::new();
        let (tx1, _rx1) = oneshot::channel();
        client.send_request(&req, tx1).await.expect("first send");

        let (tx2, _rx2) = oneshot::channel();
        let err = client
            .send_request(&req, tx2)
            .await
            .expect_err("duplicate id should fail");
        assert_eq!(err.kind, ErrorKind::InternalService);
    }

    #[tokio::test]
    async fn test_send_request_write_failure_resolves_and_removes_entry() {
        let transport = LoopTransport::new();
        transport.write_failures.store(1, Ordering::SeqCst);
        let client = WebsocketClient::new(transport.clone());

        let req = DescribePlayerSessionsRequest::new();
        let (tx, rx) = oneshot::channel();
        let err = client.send_request(&req, tx).await.expect_err("should fail");
        assert_eq!(err.kind, ErrorKind::ServiceCallFailed);

        // The waiter observes the channel closing without a value.
        assert!(rx.await.is_err());

        // And the entry is gone: the same id can be stored again.
        let (tx2, _rx2) = oneshot::channel();
        client.send_request(&req, tx2).await.expect("id should be free");
    }

    #[tokio::test]
    async fn test_cancel_request_closes_channel_without_value() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let req = DescribePlayerSessionsRequest::new();
        let id = req.request_id().to_string();
        let (tx, rx) = oneshot::channel();
        client.send_request(&req, tx).await.expect("send");

        client.cancel_request(&id);
        assert!(rx.await.is_err(), "waiter should see the channel close");

        // A late response for the cancelled id is dropped.
        transport.inject(&response_frame(&id, 200)).await;
    }

    #[tokio::test]
    async fn test_async_handler_receives_notification_frame() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        client.add_handler(
            Action::CreateGameSession,
            Arc::new(move |data| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().unwrap().push(data);
                }) as BoxFuture<'static, ()>
            }),
        );

        transport
            .inject(
                r#"{"Action":"CreateGameSession","RequestId":"r9","StatusCode":200,"GameSessionId":"gs-1"}"#,
            )
            .await;

        let frames = received.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(String::from_utf8_lossy(&frames[0]).contains("gs-1"));
    }

    #[tokio::test]
    async fn test_frame_without_waiter_or_handler_is_dropped() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());
        let _ = client;

        // No pending entry, no handler: routing just drops it.
        transport.inject(&response_frame("unknown", 200)).await;
    }

    #[tokio::test]
    async fn test_non_200_without_request_id_is_dropped() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        client.add_handler(
            Action::CreateGameSession,
            Arc::new(move |_| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as BoxFuture<'static, ()>
            }),
        );

        transport
            .inject(r#"{"Action":"CreateGameSession","RequestId":"","StatusCode":500}"#)
            .await;

        assert_eq!(handled.load(Ordering::SeqCst), 0, "handler must not fire");
    }

    #[tokio::test]
    async fn test_close_cancels_all_outstanding_waiters() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());

        let req1 = DescribePlayerSessionsRequest::new();
        let req2 = DescribePlayerSessionsRequest::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        client.send_request(&req1, tx1).await.expect("send");
        client.send_request(&req2, tx2).await.expect("send");

        client.close().await.expect("close should succeed");

        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());

        // All further sends fail.
        let err = client
            .send_message(&serde_json::json!({"Action": "HeartbeatServerProcess"}))
            .await
            .expect_err("send after close should fail");
        assert_eq!(err.kind, ErrorKind::ServiceCallFailed);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let transport = LoopTransport::new();
        let client = WebsocketClient::new(transport.clone());
        let _ = client;

        transport.inject("{{not json").await;
    }
}
