use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Longest upstream error body relayed to callers, in characters.
const MAX_UPSTREAM_BODY: usize = 512;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Request to LLM endpoint failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("LLM endpoint did not answer in time")]
    Timeout,

    #[error("LLM endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid response from LLM endpoint: {0}")]
    InvalidResponse(String),

    #[error("LLM endpoint returned no completion")]
    EmptyCompletion,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn upstream(status: u16, body: &str) -> Self {
        let body = body.trim();
        let body = match body.char_indices().nth(MAX_UPSTREAM_BODY) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Error::Upstream { status, body }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Error::Transport(_)
            | Error::Upstream { .. }
            | Error::InvalidResponse(_)
            | Error::EmptyCompletion => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Bind { .. } | Error::Serve(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// The URL carries the endpoint and deployment only; the key travels in a header.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(err.without_url())
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
