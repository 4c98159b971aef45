//! Write-retry decorator.
//!
//! Wraps any [`Transport`] and retries failed writes with a linear-growth
//! delay of `(i + 1) × factor × interval` after attempt `i`. The transport
//! underneath already recovers from network interrupts; this layer rides
//! out the window where a reconnect is still in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use fleetlink_protocol::{ErrorKind, FleetError};

use crate::{ReadHandler, Transport};

/// Tuning for [`RetryTransport`]. The defaults match the service contract;
/// the configuration layer may override them from the environment.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum write attempts.
    pub max_attempts: usize,
    /// Multiplier applied to the delay growth.
    pub factor: u32,
    /// Base delay unit.
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            factor: 2,
            interval: Duration::from_secs(2),
        }
    }
}

/// A [`Transport`] decorator that retries writes.
pub struct RetryTransport {
    next: Arc<dyn Transport>,
    config: RetryConfig,
}

impl RetryTransport {
    pub fn new(next: Arc<dyn Transport>, config: RetryConfig) -> Self {
        Self { next, config }
    }
}

#[async_trait]
impl Transport for RetryTransport {
    async fn connect(&self, url: &str) -> Result<(), FleetError> {
        self.next.connect(url).await
    }

    async fn write(&self, data: &[u8]) -> Result<(), FleetError> {
        for attempt in 0..self.config.max_attempts {
            let err = match self.next.write(data).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            tracing::debug!(
                error = %err,
                attempt = attempt + 1,
                max_attempts = self.config.max_attempts,
                "write failed, retrying"
            );
            let delay = self.config.interval * ((attempt as u32 + 1) * self.config.factor);
            tokio::time::sleep(delay).await;
        }

        Err(FleetError::with_name_message(
            ErrorKind::WebsocketRetriableSendMessageFailure,
            "Failed write retry",
            "write attempt overflow",
        ))
    }

    fn set_read_handler(&self, handler: ReadHandler) {
        self.next.set_read_handler(handler);
    }

    async fn reconnect(&self) -> Result<(), FleetError> {
        self.next.reconnect().await
    }

    async fn close(&self) -> Result<(), FleetError> {
        self.next.close().await
    }
}

// =========================================================================
// Tests
// =========================================================================
