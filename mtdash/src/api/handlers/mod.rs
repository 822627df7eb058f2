//! HTTP request handlers for the dashboard API.
//!
//! Handlers only validate query parameters and hand off to [`crate::analytics::Analytics`]; every
//! analytics endpoint answers `200` with a panel, degraded or not.
//!
//! - [`overview`]: landing view
//! - [`users`]: activity, per-user statistics, top users, users at risk and segments
//! - [`trips`]: trip summary, usage patterns and the live activity feed
//! - [`reports`]: revenue, growth and retention
//! - [`status`]: connection health, client metrics and cache maintenance

pub mod overview;
pub mod reports;
pub mod status;
pub mod trips;
pub mod users;

use crate::errors::{Error, Result};
use std::fmt::Display;

pub const MAX_WINDOW_DAYS: u32 = 365;
pub const MAX_LIMIT: usize = 500;

/// Resolve an optional query parameter, rejecting values outside `min..=max`.
pub(crate) fn bounded<T>(name: &str, value: Option<T>, default: T, min: T, max: T) -> Result<T>
where
    T: PartialOrd + Copy + Display,
{
    let value = value.unwrap_or(default);
    if value < min || value > max {
        return Err(Error::bad_request(format!("{name} must be between {min} and {max}, got {value}")));
    }
    Ok(value)
}

pub(crate) fn window_days(name: &str, value: Option<u32>, default: u32) -> Result<u32> {
    bounded(name, value, default, 1, MAX_WINDOW_DAYS)
}

pub(crate) fn limit(value: Option<usize>, default: usize) -> Result<usize> {
    bounded("limit", value, default, 1, MAX_LIMIT)
}
