use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// Errors surfaced by the HTTP layer. Data source failures never reach here: the query layer
/// turns them into degraded panels.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid query parameters
    #[error("{message}")]
    BadRequest { message: String },
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Message returned to the caller
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::debug!("Client error: {}", self);
        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_message_is_returned() {
        let err = Error::bad_request("days must be between 1 and 365");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "days must be between 1 and 365");
    }

    #[tokio::test]
    async fn test_bad_request_response() {
        let response = Error::bad_request("limit must be between 1 and 500, got 0").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"limit must be between 1 and 500, got 0");
    }
}
