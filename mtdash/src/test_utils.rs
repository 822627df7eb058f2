//! Shared helpers for unit tests: an in-memory data source and row fixtures.

use crate::AppState;
use crate::analytics::Analytics;
use crate::client::{ClientError, DataClient, FilterOp, QueryDescriptor, ReadResponse, ReadSource, Row};
use crate::config::{ClientConfig, Config, Environment};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A [`ReadSource`] over tables held in memory.
///
/// Applies filters, order, limit and offset the way the hosted endpoint does. Scripted failures
/// queued with [`fail_next`](Self::fail_next) are returned, one per call, before any real read.
#[derive(Clone, Default)]
pub struct InMemorySource {
    tables: Arc<Mutex<HashMap<String, Vec<Row>>>>,
    failures: Arc<Mutex<VecDeque<ClientError>>>,
    failing_tables: Arc<Mutex<HashMap<String, ClientError>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = ClientError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    /// Fail every read of a table until [`heal`](Self::heal) is called.
    pub fn fail_table(&self, table: &str, error: ClientError) {
        self.failing_tables.lock().unwrap().insert(table.to_string(), error);
    }

    pub fn heal(&self) {
        self.failing_tables.lock().unwrap().clear();
        self.failures.lock().unwrap().clear();
    }

    /// Reads attempted so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadSource for InMemorySource {
    async fn read(&self, query: &QueryDescriptor) -> Result<ReadResponse, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.failing_tables.lock().unwrap().get(&query.table) {
            return Err(error.clone());
        }

        let mut rows: Vec<Row> = self
            .tables
            .lock()
            .unwrap()
            .get(&query.table)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| query.filters.iter().all(|f| matches_filter(row.get(&f.column), &f.op)))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare(a.get(&order.column), b.get(&order.column));
                if order.descending { ordering.reverse() } else { ordering }
            });
        }

        let total_count = query.count.then_some(rows.len() as u64);
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let rows = rows.into_iter().skip(offset).take(limit).collect();

        Ok(ReadResponse { rows, total_count })
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => CmpOrdering::Equal,
        (None | Some(Value::Null), _) => CmpOrdering::Less,
        (_, None | Some(Value::Null)) => CmpOrdering::Greater,
        (Some(a), Some(b)) => compare_text(&as_text(a), &as_text(b)),
    }
}

fn compare_text(a: &str, b: &str) -> CmpOrdering {
    if let (Ok(a), Ok(b)) = (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        return a.cmp(&b);
    }
    if let (Ok(a), Ok(b)) = (a.parse::<f64>(), b.parse::<f64>()) {
        return a.partial_cmp(&b).unwrap_or(CmpOrdering::Equal);
    }
    a.cmp(b)
}

fn matches_filter(value: Option<&Value>, op: &FilterOp) -> bool {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return false;
    };
    let text = as_text(value);
    match op {
        FilterOp::Eq(expected) => compare_text(&text, expected) == CmpOrdering::Equal,
        FilterOp::Gte(bound) => compare_text(&text, bound) != CmpOrdering::Less,
        FilterOp::Lt(bound) => compare_text(&text, bound) == CmpOrdering::Less,
        FilterOp::In(values) => values.iter().any(|v| v == &text),
    }
}

pub fn transient(status: u16) -> ClientError {
    ClientError::Transient {
        status: Some(status),
        message: "service unavailable".to_string(),
    }
}

/// A client over the in-memory source with default settings for the testing environment.
pub fn test_client(source: &InMemorySource) -> DataClient {
    DataClient::new(Arc::new(source.clone()), Environment::Testing, &ClientConfig::default(), 3)
}

/// Configuration for the testing environment, with nothing read from disk.
pub fn test_config() -> Config {
    Config {
        environment: Environment::Testing.as_str().to_string(),
        ..Default::default()
    }
}

/// Application state over the in-memory source, wired the way [`crate::Application`] does it.
pub fn test_state(source: &InMemorySource) -> AppState {
    let config = test_config();
    let client = Arc::new(test_client(source));
    let analytics = Arc::new(Analytics::new(client.clone(), &config.cache, config.analytics.clone()));

    AppState::builder()
        .config(config)
        .client(client)
        .analytics(analytics)
        .build()
}

/// A test server for the full router over the in-memory source.
pub fn test_server(source: &InMemorySource) -> axum_test::TestServer {
    let mut state = test_state(source);
    let router = crate::build_router(&mut state).expect("Failed to build router");
    axum_test::TestServer::new(router).expect("Failed to create test server")
}

fn to_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

pub fn profile_row(tier: &str, created_at: DateTime<Utc>) -> Row {
    profile_row_with_id(Uuid::new_v4(), &format!("User {}", &Uuid::new_v4().to_string()[..4]), tier, created_at)
}

pub fn profile_row_with_id(id: Uuid, name: &str, tier: &str, created_at: DateTime<Utc>) -> Row {
    to_row(json!({
        "id": id,
        "full_name": name,
        "phone_number": null,
        "subscription_tier": tier,
        "created_at": created_at.to_rfc3339(),
        "updated_at": created_at.to_rfc3339(),
    }))
}

/// Builder for trip rows; unspecified columns are left out of the row entirely.
pub struct TripFixture {
    row: Row,
}

impl TripFixture {
    pub fn new(user_id: Uuid, created_at: DateTime<Utc>) -> Self {
        let row = to_row(json!({
            "id": Uuid::new_v4(),
            "user_id": user_id,
            "created_at": created_at.to_rfc3339(),
        }));
        Self { row }
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.row.insert(column.to_string(), value.into());
        self
    }

    pub fn mileage(self, miles: f64) -> Self {
        self.set("mileage", miles)
    }

    pub fn actual_distance(self, miles: f64) -> Self {
        self.set("actual_distance", miles)
    }

    pub fn date(self, date: NaiveDate) -> Self {
        self.set("date", date.to_string())
    }

    pub fn times(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.set("start_time", start.to_rfc3339()).set("end_time", end.to_rfc3339())
    }

    pub fn build(self) -> Row {
        self.row
    }
}
