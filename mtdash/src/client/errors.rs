use thiserror::Error;

/// Failures surfaced by the data access client.
///
/// The client never swallows a failure: callers decide whether to degrade.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Timeouts, dropped connections, throttling and server errors. Worth retrying.
    #[error("Transient failure{}: {message}", fmt_status(.status))]
    Transient { status: Option<u16>, message: String },

    /// A transient failure persisted through every retry
    #[error("Data source unavailable after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Authentication, malformed requests and unknown tables. Never retried.
    #[error("Request rejected{}: {message}", fmt_status(.status))]
    Permanent { status: Option<u16>, message: String },

    /// The response did not have the expected structure
    #[error("Unexpected response shape: {message}")]
    DataShape { message: String },
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient { .. })
    }

    /// HTTP status of the failing response, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transient { status, .. } | ClientError::Permanent { status, .. } => *status,
            _ => None,
        }
    }

    pub(crate) fn data_shape(message: impl Into<String>) -> Self {
        ClientError::DataShape { message: message.into() }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
