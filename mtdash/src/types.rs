//! Identifier aliases shared across the crate.

use uuid::Uuid;

/// Identifier of a row in `profiles`; trips refer to it through `user_id`.
pub type ProfileId = Uuid;
pub type TripId = Uuid;
