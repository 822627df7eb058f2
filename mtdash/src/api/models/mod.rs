//! Response types of the analytics API.
//!
//! Every analytics endpoint answers with a [`Panel`]: the computed data plus a [`DataStatus`]
//! saying whether it is complete. A panel whose sources could not be read still renders, with
//! empty data and the reason attached.

pub mod growth;
pub mod overview;
pub mod retention;
pub mod revenue;
pub mod status;
pub mod trips;
pub mod users;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Completeness of a panel's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DataStatus {
    Fresh,
    /// Some sources failed; the data covers the rest
    Partial { unavailable: Vec<String> },
    /// Nothing could be read; the data is empty
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Panel<T> {
    pub data: T,
    pub status: DataStatus,
    /// Served from the result cache
    pub cached: bool,
    #[schema(value_type = String, format = "date-time")]
    pub generated_at: DateTime<Utc>,
}

impl<T> Panel<T> {
    pub fn fresh(data: T) -> Self {
        Self::with_status(data, DataStatus::Fresh)
    }

    pub fn partial(data: T, unavailable: Vec<String>) -> Self {
        Self::with_status(data, DataStatus::Partial { unavailable })
    }

    pub fn unavailable(data: T, reason: impl Into<String>) -> Self {
        Self::with_status(data, DataStatus::Unavailable { reason: reason.into() })
    }

    fn with_status(data: T, status: DataStatus) -> Self {
        Self {
            data,
            status,
            cached: false,
            generated_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.status == DataStatus::Fresh
    }
}
