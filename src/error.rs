use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failures of the chat route that end the request with an HTTP error
/// instead of a protocol frame.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    BackendStatus { status: u16, body: String },
    #[error("{0}")]
    Rejected(String),
    #[error("malformed backend response: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl TranslateError {
    pub fn status(&self) -> StatusCode {
        match self {
            TranslateError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TranslateError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "chat request failed");
        } else {
            tracing::warn!(error = %self, "rejected chat request");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("stream error: {0}")]
    Stream(String),
}
