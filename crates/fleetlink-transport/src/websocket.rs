//! The reconnecting single-socket transport.
//!
//! Owns exactly one socket at a time. The state machine is small but the
//! failure rules are precise:
//!
//! - **Connect** dials with a capped doubling backoff (the first two slots
//!   of the schedule are skipped, so sleeps run 4, 8, 16, then 32 seconds)
//!   and gives up after [`CONNECT_MAX_ATTEMPTS`] dials.
//! - **Reads** run on one task per socket; each text frame is dispatched to
//!   the registered handler on a fresh task. An abnormal read error
//!   triggers a reconnect unless one is already in progress.
//! - **Writes** are totally ordered by the write lock and retried up to
//!   [`MAX_WRITE_ATTEMPTS`] times. The abnormal failure on iteration
//!   [`RECONNECT_ON_WRITE_FAILURE_ATTEMPT`] releases the lock and
//!   reconnects; a successful reconnect does not consume an attempt.
//!   Clean-close errors return immediately and never reconnect.
//! - **Reconnect** is idempotent under contention: the atomic `reconnecting`
//!   swap elects one task to dial, and losers wait on the write lock and
//!   report the winner's outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use fleetlink_protocol::{ErrorKind, FleetError};

use crate::{ConnError, ConnSink, ConnStream, Dialer, Frame, ReadHandler, Transport};

/// Base interval of the connect backoff schedule.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Ceiling on a single backoff sleep.
pub const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(32);

/// Total dial attempts before a connect gives up.
pub const CONNECT_MAX_ATTEMPTS: u32 = 7;

/// Total write iterations before a write gives up.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// The 0-indexed write iteration whose abnormal failure triggers a
/// reconnect instead of a plain retry.
pub const RECONNECT_ON_WRITE_FAILURE_ATTEMPT: usize = 2;

const WRITE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sleep before the dial after `failed_attempts` consecutive failures.
///
/// A doubling schedule starting at [`CONNECT_RETRY_INTERVAL`] with its
/// first two slots skipped: the initial sleep is 4 s, then 8, 16, and 32 s
/// capped.
fn connect_backoff_delay(failed_attempts: u32) -> Duration {
    let factor = 1u32 << failed_attempts.min(5);
    (CONNECT_RETRY_INTERVAL * factor).min(MAX_RECONNECT_BACKOFF)
}

struct WriteState {
    sink: Option<Box<dyn ConnSink>>,
    /// Which connect installed the current sink. Read tasks use this to
    /// release only their own socket when they exit.
    generation: u64,
}

struct Inner {
    dialer: Box<dyn Dialer>,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    write: Mutex<WriteState>,
    connect_url: StdMutex<String>,
    read_handler: StdRwLock<Option<ReadHandler>>,
    generation: AtomicU64,
}

/// The production [`Transport`]: one socket, a read task per socket, and
/// synchronized reconnection.
pub struct WebsocketTransport {
    inner: Arc<Inner>,
}

impl WebsocketTransport {
    /// Creates a transport that dials through `dialer`.
    pub fn new(dialer: impl Dialer) -> Self {
        Self {
            inner: Arc::new(Inner {
                dialer: Box::new(dialer),
                connected: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                write: Mutex::new(WriteState {
                    sink: None,
                    generation: 0,
                }),
                connect_url: StdMutex::new(String::new()),
                read_handler: StdRwLock::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }
}

#[async_trait]
impl Transport for WebsocketTransport {
    async fn connect(&self, url: &str) -> Result<(), FleetError> {
        Inner::connect(&self.inner, url).await
    }

    async fn write(&self, data: &[u8]) -> Result<(), FleetError> {
        Inner::write(&self.inner, data).await
    }

    fn set_read_handler(&self, handler: ReadHandler) {
        *self
            .inner
            .read_handler
            .write()
            .expect("read handler lock poisoned") = Some(handler);
    }

    async fn reconnect(&self) -> Result<(), FleetError> {
        Inner::reconnect(&self.inner).await
    }

    async fn close(&self) -> Result<(), FleetError> {
        self.inner.close().await
    }
}

impl Inner {
    /// Dials with backoff under the write lock, replacing any existing
    /// socket and spawning the new socket's read task.
    ///
    /// Returns an explicitly boxed future: `connect` and `read_loop` call
    /// each other (via `reconnect`), and without a boxed indirection the
    /// compiler cannot resolve the cyclic `Send` bound.
    fn connect<'a>(
        inner: &'a Arc<Inner>,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), FleetError>> + Send + 'a>> {
        Box::pin(async move {
        let mut guard = inner.write.lock().await;
        // Always raised first so other tasks can tell a new connection is
        // being set up; cleared only on success.
        inner.reconnecting.store(true, Ordering::SeqCst);
        if let Err(e) = inner.close_with_guard(&mut guard).await {
            tracing::debug!(error = %e, "error closing previous websocket connection");
        }
        tracing::debug!(%url, "establishing websocket connection");

        let mut failed_attempts: u32 = 0;
        let connection = loop {
            match inner.dialer.dial(url).await {
                Ok(connection) => break connection,
                Err(e) => {
                    failed_attempts += 1;
                    if failed_attempts >= CONNECT_MAX_ATTEMPTS {
                        return Err(FleetError::with_message(
                            ErrorKind::WebsocketConnectFailure,
                            format!("connection error: {e}"),
                        ));
                    }
                    let delay = connect_backoff_delay(failed_attempts);
                    tracing::debug!(
                        error = %e,
                        attempt = failed_attempts,
                        ?delay,
                        "dial failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        guard.sink = Some(connection.sink);
        guard.generation = generation;
        *inner.connect_url.lock().expect("connect url lock poisoned") = url.to_string();
        inner.connected.store(true, Ordering::SeqCst);
        inner.reconnecting.store(false, Ordering::SeqCst);

        tokio::spawn(Arc::clone(inner).read_loop(connection.stream, generation));
        Ok(())
        })
    }

    /// Blocks until an in-progress reconnect finishes, or performs one.
    async fn reconnect(inner: &Arc<Inner>) -> Result<(), FleetError> {
        if inner.reconnecting.swap(true, Ordering::SeqCst) {
            // Another task is re-establishing the socket. Wait for it to
            // release the write lock and report its outcome.
            let _guard = inner.write.lock().await;
            return if inner.connected.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(FleetError::new(ErrorKind::WebsocketConnectFailure))
            };
        }
        let url = inner
            .connect_url
            .lock()
            .expect("connect url lock poisoned")
            .clone();
        let result = Inner::connect(inner, &url).await;
        inner.reconnecting.store(false, Ordering::SeqCst);
        result
    }

    async fn write(inner: &Arc<Inner>, data: &[u8]) -> Result<(), FleetError> {
        let mut guard = inner.write.lock().await;
        if !inner.connected.load(Ordering::SeqCst) {
            return Err(FleetError::new(ErrorKind::NotInitialized));
        }

        let mut retries: usize = 0;
        let mut last_error = String::new();
        while retries < MAX_WRITE_ATTEMPTS {
            let result = match guard.sink.as_mut() {
                Some(sink) => sink.send_text(data).await,
                None => return Err(FleetError::new(ErrorKind::NotInitialized)),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.abnormal => {
                    if retries == RECONNECT_ON_WRITE_FAILURE_ATTEMPT {
                        drop(guard);
                        if Inner::handle_network_interrupt(inner, &e).await.is_ok() {
                            // A successful recovery does not consume an attempt.
                            retries -= 1;
                        }
                        guard = inner.write.lock().await;
                    } else {
                        tracing::debug!(error = %e, "failed to write message, retrying");
                        tokio::time::sleep(WRITE_RETRY_DELAY).await;
                    }
                    last_error = e.message;
                    retries += 1;
                }
                Err(e) => {
                    // Clean-close: surface directly, never reconnect.
                    return Err(FleetError::with_name_message(
                        ErrorKind::WebsocketSendMessageFailure,
                        "Failed write data",
                        e.message,
                    ));
                }
            }
        }

        Err(FleetError::with_name_message(
            ErrorKind::WebsocketSendMessageFailure,
            "Failed write data",
            last_error,
        ))
    }

    async fn handle_network_interrupt(
        inner: &Arc<Inner>,
        cause: &ConnError,
    ) -> Result<(), FleetError> {
        tracing::warn!(error = %cause, "detected network interruption, reconnecting");
        if let Err(e) = Inner::reconnect(inner).await {
            tracing::error!(error = %e, "reconnect failed");
            return Err(e);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), FleetError> {
        let mut guard = self.write.lock().await;
        self.close_with_guard(&mut guard).await
    }

    /// Closes the socket if `connected` was still set; exactly one caller
    /// wins the flag and performs the close.
    async fn close_with_guard(
        &self,
        guard: &mut MutexGuard<'_, WriteState>,
    ) -> Result<(), FleetError> {
        if self
            .connected
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::debug!("closing websocket connection");
            if let Some(mut sink) = guard.sink.take() {
                sink.close().await.map_err(|e| {
                    FleetError::with_message(ErrorKind::WebsocketClosingError, e.message)
                })?;
            }
        }
        Ok(())
    }

    fn read_handler(&self) -> Option<ReadHandler> {
        self.read_handler
            .read()
            .expect("read handler lock poisoned")
            .clone()
    }

    /// One task per socket: reads until an error, dispatching each text
    /// frame on a fresh task.
    async fn read_loop(self: Arc<Self>, mut stream: Box<dyn ConnStream>, generation: u64) {
        loop {
            match stream.next_frame().await {
                Some(Ok(Frame::Text(text))) => {
                    if let Some(handler) = self.read_handler() {
                        tokio::spawn(handler(text.into_bytes()));
                    }
                }
                Some(Ok(Frame::Binary(_))) => {
                    tracing::warn!(
                        read_task = generation,
                        "unknown data received, skipping non-text frame"
                    );
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    tracing::debug!(
                        read_task = generation,
                        ?code,
                        %reason,
                        "socket disconnected by peer"
                    );
                    // The peer completed (or initiated) a close handshake;
                    // this is not a network interrupt.
                    self.connected.store(false, Ordering::SeqCst);
                    break;
                }
                Some(Err(e)) => {
                    if e.abnormal {
                        if !self.reconnecting.load(Ordering::SeqCst) {
                            tracing::error!(
                                read_task = generation,
                                error = %e,
                                "websocket read failed"
                            );
                            if self.connected.load(Ordering::SeqCst) {
                                if let Err(re) =
                                    Inner::handle_network_interrupt(&self, &e).await
                                {
                                    tracing::error!(
                                        read_task = generation,
                                        error = %re,
                                        "failed to handle network interrupt"
                                    );
                                }
                            }
                        } else {
                            tracing::debug!(
                                read_task = generation,
                                "ongoing connection setup"
                            );
                        }
                    }
                    break;
                }
                None => break,
            }
        }

        // Release the socket this task owned, unless a reconnect has
        // already swapped in a newer one.
        let mut guard = self.write.lock().await;
        if guard.generation == generation {
            if let Some(mut sink) = guard.sink.take() {
                let _ = sink.close().await;
            }
        }
        tracing::debug!(read_task = generation, "read loop ending");
    }
}

// =========================================================================
// Tests
// =========================================================================
