//! Wire protocol for the fleetlink SDK.
//!
//! This crate defines the language spoken with the fleet service:
//!
//! - **Envelope** ([`Message`], [`ResponseMessage`], [`Action`]) — the
//!   `{Action, RequestId[, StatusCode, ErrorMessage]}` prefix common to
//!   every frame, and the closed action set.
//! - **Requests / notifications / results** ([`request`], [`notify`],
//!   [`result`]) — the typed payloads for each operation.
//! - **Data model** ([`model`]) — game/player session records, attribute
//!   values, and matchmaker-document parsing.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how frames become bytes.
//! - **Errors** ([`ErrorKind`], [`FleetError`], [`Outcome`]) — the fixed
//!   taxonomy every layer reports through, including the peer status-code
//!   mapping.

mod codec;
mod envelope;
mod error;
pub mod model;
pub mod notify;
pub mod request;
pub mod result;

pub use codec::{Codec, JsonCodec};
pub use envelope::{Action, Message, Request, ResponseMessage, STATUS_OK};
pub use error::{ErrorKind, FleetError, Outcome};
