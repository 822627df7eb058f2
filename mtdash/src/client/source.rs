//! The raw read endpoint of the hosted database.
//!
//! [`ReadSource`] is the seam the client composes its retry and rate limiting decorators over.
//! [`PostgrestSource`] talks to the PostgREST endpoint of the hosted project and classifies every
//! failure as transient, permanent or a data shape problem.

use super::errors::ClientError;
use super::query::{QueryDescriptor, ReadResponse, Row};
use crate::config::{ConfigError, DataSourceSettings};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const REST_PATH: &str = "rest/v1/";

/// A read-only view of the remote tables.
#[async_trait]
pub trait ReadSource: Send + Sync {
    async fn read(&self, query: &QueryDescriptor) -> Result<ReadResponse, ClientError>;
}

#[async_trait]
impl<S: ReadSource + ?Sized> ReadSource for Arc<S> {
    async fn read(&self, query: &QueryDescriptor) -> Result<ReadResponse, ClientError> {
        (**self).read(query).await
    }
}

/// Reads tables over the PostgREST HTTP interface.
pub struct PostgrestSource {
    client: Client,
    base_url: Url,
    key: String,
    request_timeout: Duration,
}

impl PostgrestSource {
    pub fn new(settings: &DataSourceSettings) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let base_url = ensure_slash(&settings.url)
            .join(REST_PATH)
            .map_err(|e| ConfigError::InvalidUrl {
                environment: settings.environment,
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            key: settings.key.clone(),
            request_timeout: settings.timeout,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, ClientError> {
        if table.is_empty() || table.contains(['/', '?', '#']) {
            return Err(ClientError::Permanent {
                status: None,
                message: format!("invalid table name '{table}'"),
            });
        }
        self.base_url.join(table).map_err(|e| ClientError::Permanent {
            status: None,
            message: format!("failed to construct URL for table '{table}': {e}"),
        })
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends rather than replaces the last
/// path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

#[async_trait]
impl ReadSource for PostgrestSource {
    #[instrument(skip(self, query), fields(table = %query.table), err)]
    async fn read(&self, query: &QueryDescriptor) -> Result<ReadResponse, ClientError> {
        let url = self.table_url(&query.table)?;
        debug!("Reading from {}", url);

        let mut request = self
            .client
            .get(url)
            .query(&query.to_query_pairs())
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header(header::ACCEPT, "application/json")
            .timeout(self.request_timeout);
        if query.count {
            request = request.header("Prefer", "count=exact");
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = map_status_error(status, &body);
            warn!(table = %query.table, "Read rejected with {}: {}", status, err);
            return Err(err);
        }

        let total_count = if query.count {
            response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
        } else {
            None
        };

        let body = response.bytes().await.map_err(map_transport_error)?;
        let rows = decode_rows(&body)?;
        debug!(rows = rows.len(), "Read complete");

        Ok(ReadResponse { rows, total_count })
    }
}

fn map_transport_error(e: reqwest::Error) -> ClientError {
    let status = e.status().map(|s| s.as_u16());
    if e.is_decode() {
        ClientError::data_shape(e.to_string())
    } else if e.is_builder() {
        ClientError::Permanent {
            status,
            message: e.to_string(),
        }
    } else {
        // Timeouts, refused or reset connections and truncated bodies
        ClientError::Transient {
            status,
            message: e.to_string(),
        }
    }
}

fn map_status_error(status: StatusCode, body: &str) -> ClientError {
    let message = error_message(status, body);
    match status.as_u16() {
        408 | 425 | 429 | 500..=599 => ClientError::Transient {
            status: Some(status.as_u16()),
            message,
        },
        _ => ClientError::Permanent {
            status: Some(status.as_u16()),
            message,
        },
    }
}

/// PostgREST errors carry a JSON body with a `message` field; fall back to the raw text.
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string));

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => status.canonical_reason().unwrap_or("request failed").to_string(),
        None => body.chars().take(200).collect(),
    }
}

fn decode_rows(body: &[u8]) -> Result<Vec<Row>, ClientError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ClientError::data_shape(format!("response is not valid JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(ClientError::data_shape("expected a JSON array of rows"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(row) => Ok(row),
            other => Err(ClientError::data_shape(format!("row {i} is not an object: {other}"))),
        })
        .collect()
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.split_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(uri: &str, timeout: Duration) -> PostgrestSource {
        let settings = DataSourceSettings {
            environment: Environment::Testing,
            url: Url::parse(uri).unwrap(),
            key: "test-key".to_string(),
            timeout,
            max_retries: 0,
        };
        PostgrestSource::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_read_sends_query_and_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/trips"))
            .and(query_param("select", "id,user_id"))
            .and(query_param("created_at", "gte.2024-05-01T00:00:00Z"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "2"))
            .and(header("apikey", "test-key"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a", "user_id": "u1"},
                {"id": "b", "user_id": "u2"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let source = source_for(&server.uri(), Duration::from_secs(5));
        let query = QueryDescriptor::new("trips")
            .select(["id", "user_id"])
            .gte("created_at", "2024-05-01T00:00:00Z")
            .order_by("created_at", true)
            .limit(2);

        let response = source.read(&query).await.unwrap();
        assert_eq!(response.rows.len(), 2);
        assert_eq!(response.rows[1]["user_id"], "u2");
        assert_eq!(response.total_count, None);
    }

    #[tokio::test]
    async fn test_exact_count_from_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(header("prefer", "count=exact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-range", "0-0/42")
                    .set_body_json(json!([{"id": "a"}])),
            )
            .mount(&server)
            .await;

        let source = source_for(&server.uri(), Duration::from_secs(5));
        let query = QueryDescriptor::new("profiles").select(["id"]).limit(1).with_count();
        let response = source.read(&query).await.unwrap();
        assert_eq!(response.total_count, Some(42));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases = [
            (503, true),
            (500, true),
            (429, true),
            (408, true),
            (401, false),
            (403, false),
            (400, false),
            (404, false),
        ];

        for (status, transient) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({"message": "nope"})))
                .mount(&server)
                .await;

            let source = source_for(&server.uri(), Duration::from_secs(5));
            let err = source.read(&QueryDescriptor::new("profiles")).await.unwrap_err();

            assert_eq!(err.is_transient(), transient, "status {status} misclassified: {err:?}");
            assert_eq!(err.status(), Some(status));
            if !transient {
                assert!(matches!(err, ClientError::Permanent { ref message, .. } if message == "nope"));
            }
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let source = source_for(&server.uri(), Duration::from_millis(50));
        let err = source.read(&QueryDescriptor::new("trips")).await.unwrap_err();
        assert!(err.is_transient(), "expected transient, got {err:?}");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Nothing listens on port 1
        let source = source_for("http://127.0.0.1:1", Duration::from_secs(2));
        let err = source.read(&QueryDescriptor::new("trips")).await.unwrap_err();
        assert!(err.is_transient(), "expected transient, got {err:?}");
    }

    #[tokio::test]
    async fn test_unexpected_body_is_data_shape_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/trips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&server)
            .await;

        let source = source_for(&server.uri(), Duration::from_secs(5));
        let err = source.read(&QueryDescriptor::new("trips")).await.unwrap_err();
        assert!(matches!(err, ClientError::DataShape { .. }));
        let err = source.read(&QueryDescriptor::new("profiles")).await.unwrap_err();
        assert!(matches!(err, ClientError::DataShape { .. }));
    }

    #[test]
    fn test_base_url_keeps_project_path() {
        let source = source_for("https://example.co/proxy", Duration::from_secs(1));
        let url = source.table_url("trips").unwrap();
        assert_eq!(url.as_str(), "https://example.co/proxy/rest/v1/trips");
        assert!(source.table_url("a/b").is_err());
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
    }
}
