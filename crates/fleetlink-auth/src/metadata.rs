//! Container task-metadata discovery.
//!
//! On container computes the host id is not configured up front: it is
//! derived from the task metadata service. The task id is the last
//! `/`-separated token of the last `:`-separated segment of the `TaskARN`.

use serde::Deserialize;

use fleetlink_protocol::{ErrorKind, FleetError};

/// Environment variable holding the metadata service base URL.
pub const ENV_CONTAINER_METADATA_URI: &str = "ECS_CONTAINER_METADATA_URI_V4";

const TASK_METADATA_RELATIVE_PATH: &str = "task";

/// The slice of task metadata the SDK needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTaskMetadata {
    /// The task id, used as the compute's host id.
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskMetadataDocument {
    #[serde(rename = "TaskARN", default)]
    task_arn: String,
}

/// Fetches task metadata from the container metadata service.
pub struct ContainerMetadataFetcher {
    http: reqwest::Client,
    base_url_override: Option<String>,
}

impl ContainerMetadataFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url_override: None,
        }
    }

    /// Overrides the metadata base URL. Tests point this at a local server.
    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url_override: Some(base_url.into()),
        }
    }

    /// Fetches the task metadata and extracts the task id from `TaskARN`.
    pub async fn fetch_container_task_metadata(
        &self,
    ) -> Result<ContainerTaskMetadata, FleetError> {
        let base_url = match &self.base_url_override {
            Some(url) => url.clone(),
            None => std::env::var(ENV_CONTAINER_METADATA_URI).map_err(|_| {
                FleetError::with_message(
                    ErrorKind::BadRequest,
                    format!("environment variable {ENV_CONTAINER_METADATA_URI} is not set"),
                )
            })?,
        };

        let uri = format!("{base_url}/{TASK_METADATA_RELATIVE_PATH}");
        tracing::debug!(%uri, "fetching container task metadata");

        let response = self.http.get(&uri).send().await.map_err(|e| {
            FleetError::with_message(
                ErrorKind::LocalConnectionFailed,
                format!("failed to fetch container task metadata: {e}"),
            )
        })?;

        if !response.status().is_success() {
            return Err(FleetError::with_message(
                ErrorKind::LocalConnectionFailed,
                format!(
                    "unsuccessful response from metadata service: {}",
                    response.status()
                ),
            ));
        }

        let document = response.json::<TaskMetadataDocument>().await.map_err(|e| {
            FleetError::with_message(
                ErrorKind::InternalService,
                format!("failed to parse task metadata: {e}"),
            )
        })?;

        let task_id = extract_task_id(&document.task_arn)?;
        Ok(ContainerTaskMetadata { task_id })
    }
}

/// Extracts the task id from a task ARN such as
/// `arn:aws:ecs:us-east-1:123:task/cluster/abc123` (yielding `abc123`).
fn extract_task_id(task_arn: &str) -> Result<String, FleetError> {
    if task_arn.is_empty() {
        return Err(FleetError::with_message(
            ErrorKind::InternalService,
            "TaskARN is not available in container task metadata",
        ));
    }

    let segments: Vec<&str> = task_arn.split(':').collect();
    if segments.len() < 4 {
        return Err(FleetError::with_message(
            ErrorKind::InternalService,
            "invalid TaskARN format",
        ));
    }

    let task_reference = segments[segments.len() - 1];
    let task_id = task_reference
        .rsplit('/')
        .next()
        .unwrap_or(task_reference)
        .to_string();
    Ok(task_id)
}

// =========================================================================
// Tests
// =========================================================================
