//! Handshake signing and credential discovery for the fleetlink SDK.
//!
//! Three concerns live here, all consumed by the server-state layer during
//! initialization:
//!
//! 1. **Signing** ([`generate_sigv4_query_parameters`]) — turns the connect
//!    query parameters into a signed parameter set when no auth token is
//!    available.
//! 2. **Container credentials** ([`ContainerCredentialsFetcher`]) — fetches
//!    the credential triple from the local provider on container computes.
//! 3. **Container metadata** ([`ContainerMetadataFetcher`]) — derives the
//!    host id from the task metadata service.

mod credentials;
mod metadata;
mod sigv4;

pub use credentials::{AwsCredentials, ContainerCredentialsFetcher, ENV_CONTAINER_CREDENTIALS};
pub use metadata::{ContainerMetadataFetcher, ContainerTaskMetadata, ENV_CONTAINER_METADATA_URI};
pub use sigv4::{generate_sigv4_query_parameters, SigV4Parameters, AUTHORIZATION_KEY};
