//! Codec trait and the JSON implementation used on the wire.
//!
//! The service speaks JSON text frames, but the layers above the transport
//! only depend on the [`Codec`] trait, so tests (and any future binary
//! protocol) can swap the implementation without touching routing code.

use serde::{de::DeserializeOwned, Serialize};

use crate::{ErrorKind, FleetError};

/// Converts between typed messages and raw frame bytes.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into frame bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, FleetError>;

    /// Deserializes frame bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, FleetError>;
}

/// A [`Codec`] backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, FleetError> {
        serde_json::to_vec(value).map_err(|e| {
            FleetError::with_message(ErrorKind::InternalService, format!("encode failed: {e}"))
        })
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, FleetError> {
        serde_json::from_slice(data).map_err(|e| {
            FleetError::with_message(ErrorKind::InternalService, format!("decode failed: {e}"))
        })
    }
}
