use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io, path::PathBuf, sync::Arc};
use thiserror::Error;

use crate::config::{API_KEY_ENV, API_KEYS_URL, VERBOSE_ERRORS_ENV};

/// Coarse error kinds, so SDK callers can branch without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Credential,
    Transport,
    Integrity,
    Timeout,
    ResourceConflict,
    InvalidInput,
    Io,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(
        "API key not found! Get one at {} and set it as the `{}` environment variable",
        API_KEYS_URL,
        API_KEY_ENV
    )]
    MissingApiKey,

    #[error("authentication failed: {0}")]
    Credential(String),

    #[error(
        "cannot perform browser-based authentication in a headless environment; generate an API key \
         at {} and set the `{}` environment variable instead",
        API_KEYS_URL,
        API_KEY_ENV
    )]
    Headless,

    #[error(
        "authentication requires local port {port}; please close the application using it and try again"
    )]
    PortInUse {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("authentication timed out after {0} seconds")]
    Timeout(u64),

    #[error("{method} {url} failed with status {status}")]
    Http {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    #[error("upload {upload_id} failed at part {part_number} (byte offset {offset})")]
    UploadPart {
        upload_id: String,
        part_number: u32,
        offset: u64,
        #[source]
        source: Box<ClientError>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("token validation failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Shared(Arc<ClientError>),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::MissingApiKey
            | ClientError::Credential(_)
            | ClientError::Headless
            | ClientError::Jwt(_) => ErrorCategory::Credential,
            ClientError::Http { .. } | ClientError::Transport(_) => ErrorCategory::Transport,
            ClientError::ChecksumMismatch { .. }
            | ClientError::MalformedResponse(_)
            | ClientError::Json(_) => ErrorCategory::Integrity,
            ClientError::Timeout(_) => ErrorCategory::Timeout,
            ClientError::PortInUse { .. } => ErrorCategory::ResourceConflict,
            ClientError::InvalidInput(_) | ClientError::Url(_) => ErrorCategory::InvalidInput,
            ClientError::FileNotFound(_) | ClientError::Io(_) => ErrorCategory::Io,
            ClientError::UploadPart { source, .. } => source.category(),
            ClientError::Shared(inner) => inner.category(),
        }
    }

    /// HTTP status of a non-2xx response, looking through wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status().map(|s| s.as_u16()),
            ClientError::UploadPart { source, .. } => source.status(),
            ClientError::Shared(inner) => inner.status(),
            _ => None,
        }
    }

    /// Recover an owned error from one shared between concurrent waiters.
    pub fn from_shared(err: Arc<ClientError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(ClientError::Shared)
    }
}

/// Human-readable remediation for well-known status codes.
pub fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("the server rejected the request parameters"),
        401 => Some("your credentials were rejected; set a valid API key or log in again"),
        403 => Some("you do not have permission to access this resource"),
        404 => Some("run the corresponding `list` command to see valid identifiers"),
        413 => Some("the file is too large for a single request"),
        429 => Some("too many requests; wait a moment and try again"),
        500..=599 => Some("the server encountered an error; try again later"),
        _ => None,
    }
}

/// Pointer printed when a command fails outside verbose mode.
pub fn verbose_pointer() -> String {
    format!("set `{VERBOSE_ERRORS_ENV}=1` to see the full error details")
}

/// Error returned by the local OAuth callback handlers.
#[derive(Debug)]
pub struct CallbackError {
    pub status: StatusCode,
    pub message: String,
}

impl CallbackError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CallbackError {}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}
