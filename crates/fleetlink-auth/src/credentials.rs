//! Container credential discovery.
//!
//! On container computes the SDK starts with no credentials at all: they
//! are fetched from the local container-credentials provider before the
//! first connect. The provider address is fixed; only the relative path
//! comes from the environment.

use serde::Deserialize;

use fleetlink_protocol::{ErrorKind, FleetError};

/// The AWS credential triple used for handshake signing.
///
/// Deserializes from the container credential provider's response shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct AwsCredentials {
    #[serde(rename = "AccessKeyId", default)]
    pub access_key: String,

    #[serde(rename = "SecretAccessKey", default)]
    pub secret_key: String,

    #[serde(rename = "Token", default)]
    pub session_token: String,
}

/// Base address of the container credential provider.
const CONTAINER_CREDENTIAL_PROVIDER_URL: &str = "http://169.254.170.2";

/// Environment variable holding the provider's relative URI.
pub const ENV_CONTAINER_CREDENTIALS: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";

/// Fetches credentials from the container credential provider.
pub struct ContainerCredentialsFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl ContainerCredentialsFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: CONTAINER_CREDENTIAL_PROVIDER_URL.to_string(),
        }
    }

    /// Overrides the provider base URL. Tests point this at a local server.
    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetches the credential triple from the provider.
    ///
    /// The relative URI comes from [`ENV_CONTAINER_CREDENTIALS`]; a missing
    /// variable, a non-2xx response, or an undecodable body all fail
    /// initialization.
    pub async fn fetch_container_credentials(&self) -> Result<AwsCredentials, FleetError> {
        let relative_uri = std::env::var(ENV_CONTAINER_CREDENTIALS).map_err(|_| {
            FleetError::with_message(
                ErrorKind::BadRequest,
                format!("environment variable {ENV_CONTAINER_CREDENTIALS} is not set"),
            )
        })?;

        let uri = format!("{}{relative_uri}", self.base_url);
        tracing::debug!(%uri, "fetching container credentials");

        let response = self.http.get(&uri).send().await.map_err(|e| {
            FleetError::with_message(
                ErrorKind::LocalConnectionFailed,
                format!("failed to fetch container credentials: {e}"),
            )
        })?;

        if !response.status().is_success() {
            return Err(FleetError::with_message(
                ErrorKind::LocalConnectionFailed,
                format!(
                    "unsuccessful response from credentials provider: {}",
                    response.status()
                ),
            ));
        }

        response.json::<AwsCredentials>().await.map_err(|e| {
            FleetError::with_message(
                ErrorKind::InternalService,
                format!("failed to decode credentials: {e}"),
            )
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
