//! Typed rows of the `profiles` and `trips` tables.
//!
//! Only the identifiers are required. Every other column may be missing or null, and numeric or
//! timestamp columns are accepted in the several shapes the hosted endpoint renders them in.

use crate::client::{ClientError, Row};
use crate::types::{ProfileId, TripId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const PROFILE_COLUMNS: &[&str] = &[
    "id",
    "full_name",
    "phone_number",
    "subscription_tier",
    "created_at",
    "updated_at",
];

/// Columns the aggregates need; the free-form route columns are left on the server.
pub const TRIP_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "date",
    "start_time",
    "end_time",
    "start_location",
    "end_location",
    "mileage",
    "actual_distance",
    "planned_distance",
    "fuel_used",
    "reimbursement",
    "purpose",
    "is_round_trip",
    "status",
    "created_at",
    "updated_at",
];

pub const DEFAULT_TIER: &str = "free";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Normalised tier name; users without one are on the free tier.
    pub fn tier(&self) -> String {
        self.subscription_tier
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map_or_else(|| DEFAULT_TIER.to_string(), str::to_lowercase)
    }
}

/// A start or end time: either a full timestamp or a time of day on the trip's date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeValue {
    At(DateTime<Utc>),
    TimeOfDay(NaiveTime),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub user_id: ProfileId,
    #[serde(default, deserialize_with = "lenient::date")]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::time_value")]
    pub start_time: Option<TimeValue>,
    #[serde(default, deserialize_with = "lenient::time_value")]
    pub end_time: Option<TimeValue>,
    #[serde(default)]
    pub start_location: Option<String>,
    #[serde(default)]
    pub end_location: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub mileage: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub actual_distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub planned_distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub fuel_used: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub reimbursement: Option<f64>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub is_round_trip: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Trip {
    /// Actual distance when recorded, otherwise the logged mileage.
    pub fn effective_distance(&self) -> Option<f64> {
        self.actual_distance.or(self.mileage)
    }

    /// When the trip was recorded; the instant activity windows are measured against.
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// The trip's calendar day: its `date`, else the day it was recorded.
    pub fn day(&self) -> Option<NaiveDate> {
        self.date.or_else(|| self.created_at.map(|at| at.date_naive()))
    }

    fn resolve(&self, value: TimeValue) -> Option<DateTime<Utc>> {
        match value {
            TimeValue::At(at) => Some(at),
            TimeValue::TimeOfDay(time) => self.day().map(|day| day.and_time(time).and_utc()),
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_time.and_then(|t| self.resolve(t))
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.and_then(|t| self.resolve(t))
    }

    /// Minutes between start and end, when both are known.
    ///
    /// Times of day that run past midnight wrap to the next day. Full timestamps that end before
    /// they start are treated as unknown.
    pub fn duration_minutes(&self) -> Option<f64> {
        let span = match (self.start_time?, self.end_time?) {
            (TimeValue::TimeOfDay(start), TimeValue::TimeOfDay(end)) => {
                let span = end - start;
                if span < TimeDelta::zero() { span + TimeDelta::days(1) } else { span }
            }
            _ => self.ended_at()? - self.started_at()?,
        };

        (span >= TimeDelta::zero()).then(|| span.num_milliseconds() as f64 / 60_000.0)
    }

    /// Miles per hour, when distance is known and the trip took some time.
    pub fn average_speed_mph(&self) -> Option<f64> {
        let minutes = self.duration_minutes().filter(|m| *m > 0.0)?;
        Some(self.effective_distance()? / (minutes / 60.0))
    }
}

/// Decode response rows, failing on the first row that lacks required columns.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Row>) -> Result<Vec<T>, ClientError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| ClientError::data_shape(format!("{table} row {i}: {e}")))
        })
        .collect()
}

/// Parse the timestamp renderings seen from the hosted database. Values without an offset are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(at) = DateTime::parse_from_str(value, format) {
            return Some(at.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(value, format) {
            return Some(at.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|day| day.and_time(NaiveTime::MIN).and_utc())
}

mod lenient {
    use super::{TimeValue, parse_timestamp};
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(text(deserializer)?.and_then(|s| parse_timestamp(&s)))
    }

    pub fn date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        Ok(text(deserializer)?.and_then(|s| {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_timestamp(s).map(|at| at.date_naive()))
        }))
    }

    pub fn time_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TimeValue>, D::Error> {
        Ok(text(deserializer)?.and_then(|s| {
            let s = s.trim();
            ["%H:%M:%S%.f", "%H:%M"]
                .iter()
                .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
                .map(TimeValue::TimeOfDay)
                .or_else(|| parse_timestamp(s).map(TimeValue::At))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn trip(value: Value) -> Trip {
        serde_json::from_value(value).unwrap()
    }

    fn base() -> serde_json::Map<String, Value> {
        json!({
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "user_id": "16fd2706-8baf-433b-82eb-8c7fada847da",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn with(pairs: &[(&str, Value)]) -> Trip {
        let mut row = base();
        for (k, v) in pairs {
            row.insert(k.to_string(), v.clone());
        }
        trip(Value::Object(row))
    }

    #[test]
    fn test_effective_distance_prefers_actual() {
        let t = with(&[("mileage", json!(12.5)), ("actual_distance", json!(14.0))]);
        assert_eq!(t.effective_distance(), Some(14.0));

        let t = with(&[("mileage", json!(12.5)), ("actual_distance", Value::Null)]);
        assert_eq!(t.effective_distance(), Some(12.5));

        let t = with(&[("mileage", json!("7.25"))]);
        assert_eq!(t.effective_distance(), Some(7.25));

        assert_eq!(with(&[]).effective_distance(), None);
    }

    #[test]
    fn test_duration_requires_both_times() {
        let t = with(&[("start_time", json!("2024-05-01T08:00:00Z"))]);
        assert_eq!(t.duration_minutes(), None);
        assert_eq!(t.average_speed_mph(), None);

        let t = with(&[
            ("start_time", json!("2024-05-01T08:00:00Z")),
            ("end_time", json!("2024-05-01T08:45:00+00:00")),
            ("mileage", json!(30)),
        ]);
        assert_eq!(t.duration_minutes(), Some(45.0));
        assert_eq!(t.average_speed_mph(), Some(40.0));
    }

    #[test]
    fn test_duration_never_negative() {
        let t = with(&[
            ("start_time", json!("2024-05-01T09:00:00Z")),
            ("end_time", json!("2024-05-01T08:00:00Z")),
        ]);
        assert_eq!(t.duration_minutes(), None);

        // Times of day crossing midnight wrap
        let t = with(&[
            ("date", json!("2024-05-01")),
            ("start_time", json!("23:30")),
            ("end_time", json!("00:15:00")),
        ]);
        assert_eq!(t.duration_minutes(), Some(45.0));
    }

    #[test]
    fn test_time_of_day_anchored_to_date() {
        let t = with(&[
            ("date", json!("2024-05-01")),
            ("start_time", json!("08:00:00")),
            ("end_time", json!("2024-05-01T08:30:00Z")),
        ]);
        assert_eq!(t.started_at(), Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()));
        assert_eq!(t.duration_minutes(), Some(30.0));
    }

    #[test]
    fn test_zero_duration_has_no_speed() {
        let t = with(&[
            ("start_time", json!("2024-05-01T08:00:00Z")),
            ("end_time", json!("2024-05-01T08:00:00Z")),
            ("mileage", json!(3)),
        ]);
        assert_eq!(t.duration_minutes(), Some(0.0));
        assert_eq!(t.average_speed_mph(), None);
    }

    #[test]
    fn test_timestamp_renderings() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        for value in [
            "2024-05-01T10:30:00Z",
            "2024-05-01T10:30:00.000000+00:00",
            "2024-05-01 10:30:00+00",
            "2024-05-01T10:30:00",
            "2024-05-01 10:30:00.123",
        ] {
            let parsed = parse_timestamp(value).unwrap_or_else(|| panic!("failed to parse {value}"));
            assert_eq!(parsed.timestamp(), expected.timestamp(), "{value}");
        }
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_day_falls_back_to_created_at() {
        let t = with(&[("created_at", json!("2024-05-03T23:59:00Z"))]);
        assert_eq!(t.day(), NaiveDate::from_ymd_opt(2024, 5, 3));

        let t = with(&[("created_at", json!("2024-05-03T23:59:00Z")), ("date", json!("2024-05-02"))]);
        assert_eq!(t.day(), NaiveDate::from_ymd_opt(2024, 5, 2));
    }

    #[test]
    fn test_route_columns_are_not_selected() {
        for column in ["notes", "waypoints", "actual_route", "planned_route"] {
            assert!(!TRIP_COLUMNS.contains(&column));
        }
        // Rows from a wider select still decode
        let trip = with(&[
            ("notes", json!("client visit")),
            ("waypoints", json!([{"lat": 51.5, "lng": -0.1}])),
            ("mileage", json!(4.2)),
        ]);
        assert_eq!(trip.effective_distance(), Some(4.2));
    }

    #[test]
    fn test_decode_rows_reports_missing_ids() {
        let rows = vec![base(), json!({"user_id": "16fd2706-8baf-433b-82eb-8c7fada847da"}).as_object().cloned().unwrap()];
        let err = decode_rows::<Trip>("trips", rows).unwrap_err();
        assert!(matches!(err, ClientError::DataShape { ref message } if message.starts_with("trips row 1")));
    }

    #[test]
    fn test_profile_tier_defaults_to_free() {
        let profile: Profile = serde_json::from_value(json!({
            "id": "16fd2706-8baf-433b-82eb-8c7fada847da",
            "subscription_tier": " Premium "
        }))
        .unwrap();
        assert_eq!(profile.tier(), "premium");

        let profile: Profile = serde_json::from_value(json!({"id": "16fd2706-8baf-433b-82eb-8c7fada847da"})).unwrap();
        assert_eq!(profile.tier(), "free");
        assert_eq!(profile.created_at, None);
    }
}
