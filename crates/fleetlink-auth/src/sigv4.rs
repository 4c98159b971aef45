//! Time-bounded signing of connection query parameters.
//!
//! When the SDK has no auth token it proves its identity by signing the
//! connect query parameters with the fleet's AWS credentials, SigV4-style:
//! a canonical sorted query string is hashed, scoped to
//! `<date>/<region>/gamelift/aws4_request`, and signed with a key derived
//! by iterated HMAC-SHA-256. The whole thing is a pure function of its
//! inputs — same inputs, same instant, same signature.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use fleetlink_protocol::{ErrorKind, FleetError};

use crate::AwsCredentials;

type HmacSha256 = Hmac<Sha256>;

const SERVICE_NAME: &str = "gamelift";
const TERMINATION_STRING: &str = "aws4_request";
const SIGNATURE_SECRET_KEY_PREFIX: &str = "AWS4";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Query-parameter key for the authorization marker.
pub const AUTHORIZATION_KEY: &str = "Authorization";
const AUTHORIZATION_VALUE: &str = "SigV4";
const AMZ_ALGORITHM_KEY: &str = "X-Amz-Algorithm";
const AMZ_CREDENTIAL_KEY: &str = "X-Amz-Credential";
const AMZ_DATE_KEY: &str = "X-Amz-Date";
const AMZ_SECURITY_TOKEN_KEY: &str = "X-Amz-Security-Token";
const AMZ_SIGNATURE_KEY: &str = "X-Amz-Signature";

/// Inputs to the signature computation.
#[derive(Debug, Clone)]
pub struct SigV4Parameters {
    /// Region the fleet lives in, e.g. `us-east-1`.
    pub region: String,

    /// The credentials signing the request.
    pub credentials: AwsCredentials,

    /// The query parameters to sign.
    pub query_params: HashMap<String, String>,

    /// The instant the signature is computed for (UTC).
    pub request_time: DateTime<Utc>,
}

/// Produces the signed set of query parameters for a connection handshake.
///
/// Returns `Authorization`, `X-Amz-Algorithm`, `X-Amz-Credential`,
/// `X-Amz-Date`, and `X-Amz-Signature`, plus `X-Amz-Security-Token` when a
/// session token was supplied.
///
/// Fails with [`ErrorKind::BadRequest`] when the region, access key, secret
/// key, query map, or request time is empty.
pub fn generate_sigv4_query_parameters(
    params: &SigV4Parameters,
) -> Result<HashMap<String, String>, FleetError> {
    validate_parameters(params)?;

    let formatted_date = params.request_time.format(DATE_FORMAT).to_string();
    let formatted_date_time = params.request_time.format(DATE_TIME_FORMAT).to_string();

    let canonical_request = to_sorted_encoded_query_string(&params.query_params);
    let hashed_canonical_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));

    let scope = format!(
        "{formatted_date}/{}/{SERVICE_NAME}/{TERMINATION_STRING}",
        params.region
    );
    let string_to_sign =
        format!("{ALGORITHM}\n{formatted_date_time}\n{scope}\n{hashed_canonical_request}");

    let signature = generate_signature(
        &params.region,
        &params.credentials.secret_key,
        &formatted_date,
        &string_to_sign,
    );

    let credential = format!("{}/{scope}", params.credentials.access_key);

    let mut query = HashMap::from([
        (AUTHORIZATION_KEY.to_string(), AUTHORIZATION_VALUE.to_string()),
        (AMZ_ALGORITHM_KEY.to_string(), ALGORITHM.to_string()),
        (AMZ_CREDENTIAL_KEY.to_string(), credential),
        (AMZ_DATE_KEY.to_string(), formatted_date_time),
        (AMZ_SIGNATURE_KEY.to_string(), signature),
    ]);
    if !params.credentials.session_token.is_empty() {
        query.insert(
            AMZ_SECURITY_TOKEN_KEY.to_string(),
            params.credentials.session_token.clone(),
        );
    }

    Ok(query)
}

fn validate_parameters(params: &SigV4Parameters) -> Result<(), FleetError> {
    let missing = if params.region.is_empty() {
        "region"
    } else if params.credentials.access_key.is_empty() {
        "access key"
    } else if params.credentials.secret_key.is_empty() {
        "secret key"
    } else if params.query_params.is_empty() {
        "query parameters"
    } else if params.request_time.timestamp() == 0 {
        "request time"
    } else {
        return Ok(());
    };
    Err(FleetError::with_message(
        ErrorKind::BadRequest,
        format!("{missing} is required to sign a request"),
    ))
}

/// Derives the signing key by iterated HMAC (date → region → service →
/// termination string), then signs `string_to_sign` with it.
fn generate_signature(
    region: &str,
    secret_key: &str,
    formatted_date: &str,
    string_to_sign: &str,
) -> String {
    let secret = format!("{SIGNATURE_SECRET_KEY_PREFIX}{secret_key}");
    let hash_date = hmac_sha256(secret.as_bytes(), formatted_date);
    let hash_region = hmac_sha256(&hash_date, region);
    let hash_service = hmac_sha256(&hash_region, SERVICE_NAME);
    let signing_key = hmac_sha256(&hash_service, TERMINATION_STRING);

    hex::encode(hmac_sha256(&signing_key, string_to_sign))
}

/// Sorts the query map by key (byte-wise ascending) and joins it as
/// `encode(k)=encode(v)` pairs with `&`.
fn to_sorted_encoded_query_string(params: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    keys.iter()
        .map(|key| format!("{}={}", query_escape(key), query_escape(&params[*key])))
        .collect::<Vec<_>>()
        .join("&")
}

/// Form-style query escaping (space becomes `+`).
fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts keys of any size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

// =========================================================================
// Tests
// =========================================================================
