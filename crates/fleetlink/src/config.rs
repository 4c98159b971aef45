//! Constants, environment variables, and the env-override helpers.
//!
//! Every identity parameter can be overridden by an environment variable,
//! and the timing tunables come from the environment with catalogued
//! defaults. Durations parse as integer seconds; unparsable values log a
//! warning and fall back to the default.

use std::time::Duration;

/// Version tag sent in the connect query and activate request.
pub const SDK_VERSION: &str = "5.2.0";

/// Language tag sent in the connect query and activate request.
pub const SDK_LANGUAGE: &str = "Rust";

// Connect query parameter keys.
pub(crate) const PID_KEY: &str = "pID";
pub(crate) const SDK_VERSION_KEY: &str = "sdkVersion";
pub(crate) const SDK_LANGUAGE_KEY: &str = "sdkLanguage";
pub(crate) const COMPUTE_ID_KEY: &str = "ComputeId";
pub(crate) const FLEET_ID_KEY: &str = "FleetId";
pub(crate) const AUTH_TOKEN_KEY: &str = "Authorization";

/// Compute type selecting the container credentials flow.
pub(crate) const COMPUTE_TYPE_CONTAINER: &str = "CONTAINER";

/// Sentinel process id meaning "generate a fresh id"; never sent on the wire.
pub(crate) const MANAGED_RESOURCE_PROCESS_ID: &str = "ManagedResource";

// Identity/credential environment variables. Each overrides the
// corresponding field of `ServerParameters`.
pub const ENV_WEBSOCKET_URL: &str = "GAMELIFT_SDK_WEBSOCKET_URL";
pub const ENV_PROCESS_ID: &str = "GAMELIFT_SDK_PROCESS_ID";
pub const ENV_HOST_ID: &str = "GAMELIFT_SDK_HOST_ID";
pub const ENV_FLEET_ID: &str = "GAMELIFT_SDK_FLEET_ID";
pub const ENV_AUTH_TOKEN: &str = "GAMELIFT_SDK_AUTH_TOKEN";
pub const ENV_COMPUTE_TYPE: &str = "GAMELIFT_COMPUTE_TYPE";
pub const ENV_AWS_REGION: &str = "GAMELIFT_REGION";
pub const ENV_ACCESS_KEY: &str = "GAMELIFT_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "GAMELIFT_SECRET_KEY";
pub const ENV_SESSION_TOKEN: &str = "GAMELIFT_SESSION_TOKEN";

// Tunables.
pub const ENV_SERVICE_CALL_TIMEOUT: &str = "SERVICE_CALL_TIMEOUT";
pub const ENV_SERVICE_BUFFER_SIZE: &str = "SERVICE_BUFFER_SIZE";
pub const ENV_RETRY_INTERVAL: &str = "RETRY_INTERVAL";
pub const ENV_MAX_RETRY: &str = "MAX_RETRY";
pub const ENV_RETRY_FACTOR: &str = "RETRY_FACTOR";
pub const ENV_HEALTHCHECK_INTERVAL: &str = "HEALTHCHECK_INTERVAL";
pub const ENV_HEALTHCHECK_TIMEOUT: &str = "HEALTHCHECK_TIMEOUT";
pub const ENV_HEALTHCHECK_MAX_JITTER: &str = "HEALTHCHECK_MAX_JITTER";

pub(crate) const SERVICE_CALL_TIMEOUT_DEFAULT: Duration = Duration::from_secs(20);
pub(crate) const SERVICE_BUFFER_SIZE_DEFAULT: usize = 2048;
pub(crate) const HEALTHCHECK_INTERVAL_DEFAULT: Duration = Duration::from_secs(60);
pub(crate) const HEALTHCHECK_RETRY_INTERVAL_DEFAULT: Duration = Duration::from_secs(10);
pub(crate) const HEALTHCHECK_MAX_JITTER_DEFAULT: Duration = Duration::from_secs(10);

/// Minimum remaining lifetime for a cached fleet-role credential.
pub(crate) const ROLE_CREDENTIAL_TTL: Duration = Duration::from_secs(15 * 60);

/// Cap enforced on role session names by the assume-role API.
pub(crate) const ROLE_SESSION_NAME_MAX_LENGTH: usize = 64;

/// Cap on the ticket id accepted by start-match-backfill.
pub(crate) const BACKFILL_TICKET_ID_MAX_LENGTH: usize = 128;

/// Fixed timeout for the activate-server-process request.
pub(crate) const ACTIVATE_SERVER_PROCESS_TIMEOUT: Duration = Duration::from_secs(6);

/// Returns the environment variable, or the default when unset.
pub(crate) fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Returns the environment variable, or an error naming it when unset.
pub(crate) fn env_string_or_missing(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("{key} is not in environment"))
}

/// Returns the environment variable parsed as an integer, or the default.
pub(crate) fn env_usize_or(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Err(_) => default,
        Ok(value) => value.parse().unwrap_or_else(|e| {
            tracing::warn!(key, %value, error = %e, "failed to parse integer from environment");
            default
        }),
    }
}

/// Returns the environment variable parsed as whole seconds, or the default.
pub(crate) fn env_seconds_or(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Err(_) => default,
        Ok(value) => match value.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(e) => {
                tracing::warn!(key, %value, error = %e, "failed to parse seconds from environment");
                default
            }
        },
    }
}

// =========================================================================
// Tests
// =========================================================================
