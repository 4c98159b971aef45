//! Data-model records exchanged with the service.
//!
//! These are plain payload types: the session core treats them as opaque
//! except where a field is read back (fleet id stamping, backfill ticket
//! ids, credential expiry). Wire field names are PascalCase and pinned by
//! the serde attributes; the tests in each module assert the exact shapes.

mod attribute;
mod game_session;
mod matchmaker;
mod player;

pub use attribute::AttributeValue;
pub use game_session::{GameSession, GameSessionStatus, UpdateGameSession, UpdateReason};
pub use matchmaker::MatchmakerData;
pub use player::{Player, PlayerSession, PlayerSessionCreationPolicy, PlayerSessionStatus};

/// Upper bound on player sessions a describe result will hold.
pub const MAX_PLAYER_SESSIONS: usize = 1024;
